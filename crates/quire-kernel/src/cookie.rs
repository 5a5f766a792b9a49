//! Request cookie parsing and `Set-Cookie` construction.
//!
//! Issued cookies are `HttpOnly`, `SameSite=Lax` and scoped to `/`.

use std::borrow::Cow;

use ::cookie::CookieJar;
use ::cookie::time::{Duration, OffsetDateTime};

pub use ::cookie::{Cookie, SameSite};

/// Name of the long-lived login cookie.
pub const AUTHENTICATION_TOKEN: &str = "authentication_token";
/// Name of the read-once flash cookie.
pub const FLASH_SESSION: &str = "flash_session";

/// A session cookie (no `Max-Age`) carrying `value`.
pub fn issue(
    name: impl Into<Cow<'static, str>>,
    value: impl Into<Cow<'static, str>>,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// A cookie that tells the browser to drop `name` immediately.
pub fn removal(name: impl Into<Cow<'static, str>>, secure: bool) -> Cookie<'static> {
    let mut cookie = issue(name, "", secure);
    cookie.make_removal();
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

pub fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age() == Some(Duration::ZERO)
}

/// Cookies sent by the client.
#[derive(Debug, Clone, Default)]
pub struct Cookies(CookieJar);

impl Cookies {
    /// Parse a `Cookie:` header. Malformed pairs are skipped.
    pub fn parse(header: &str) -> Self {
        let mut jar = CookieJar::new();
        for cookie in Cookie::split_parse(header).filter_map(Result::ok) {
            jar.add_original(cookie.into_owned());
        }
        Self(jar)
    }

    /// Value for `name`, without surrounding double quotes.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(Cookie::value_trimmed)
    }

    /// Apply a `Set-Cookie`: removals drop the cookie, others replace
    /// any existing value.
    pub fn apply(&mut self, cookie: &Cookie<'static>) {
        if is_removal(cookie) {
            self.0.remove(cookie.clone());
        } else {
            self.0.add(cookie.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let cookies = Cookies::parse("a=1; flash_session=\"abc\";broken; =x; b = 2");
        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get(FLASH_SESSION), Some("abc"));
        assert_eq!(cookies.get("b"), Some("2"));
        assert_eq!(cookies.get("broken"), None);
    }

    #[test]
    fn test_issue() {
        let cookie = issue(AUTHENTICATION_TOKEN, "abc", true);
        let header = cookie.to_string();
        assert!(header.starts_with("authentication_token=abc"), "{header}");
        for attr in ["Path=/", "HttpOnly", "Secure", "SameSite=Lax"] {
            assert!(header.contains(attr), "{header} missing {attr}");
        }
        assert!(!header.contains("Max-Age"));
        assert!(!is_removal(&cookie));
    }

    #[test]
    fn test_removal() {
        let cleared = removal(FLASH_SESSION, false);
        assert!(is_removal(&cleared));
        assert_eq!(cleared.value(), "");
        let header = cleared.to_string();
        assert!(header.contains("Max-Age=0"), "{header}");
        assert!(!header.contains("Secure"));
    }

    #[test]
    fn test_apply() {
        let mut jar = Cookies::parse("a=1");
        jar.apply(&issue("a", "2", false));
        assert_eq!(jar.get("a"), Some("2"));
        jar.apply(&removal("a", false));
        assert_eq!(jar.get("a"), None);
    }
}
