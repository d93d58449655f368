// Session cookies carrying the token pair

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::models::TokenPair;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Builds the HTTP-only cookies that mirror the tokens returned in JSON bodies
#[derive(Debug, Clone, Copy)]
pub struct SessionCookies {
    secure: bool,
}

impl SessionCookies {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn build(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Add both token cookies to the jar
    pub fn issue(&self, jar: CookieJar, tokens: &TokenPair) -> CookieJar {
        jar.add(self.build(ACCESS_TOKEN_COOKIE, tokens.access_token.clone()))
            .add(self.build(REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone()))
    }

    /// Expire both token cookies
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
            .into_iter()
            .fold(jar, |jar, name| {
                let mut cookie = self.build(name, String::new());
                cookie.make_removal();
                jar.add(cookie)
            })
    }

    pub fn refresh_token(jar: &CookieJar) -> Option<String> {
        jar.get(REFRESH_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_owned())
            .filter(|token| !token.is_empty())
    }
}
