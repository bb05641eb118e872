//! Internationalization (i18n) support for rendered notifications
//!
//! Labels inside delivered messages (relic tier names, "Expires", "Arrives",
//! lifecycle words) and error descriptions come from `locales/*.yml`.
//! Supported languages: English (en), Korean (ko).
//!
//! This is unrelated to the game-data lookups in [`crate::localization`],
//! which translate upstream identifiers rather than our own strings.
//!
//! # Environment Variables
//!
//! - `RELAY_LANG`: Set the preferred language (en, ko). Defaults to English.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lotus_relay::i18n::{t, set_locale};
//!
//! set_locale("ko");
//! let label = t!("render.expires");
//! let title = t!("render.fissures.title", count = 3);
//! ```

// Note: rust_i18n::i18n! macro is declared in lib.rs (crate root)

/// Set the current locale for translations
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(normalize_locale(locale));
}

/// Get the current locale
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// Initialize i18n from the `RELAY_LANG` environment variable
///
/// Falls back to English if not set or unsupported.
pub fn init_from_env() {
    let locale = std::env::var("RELAY_LANG").unwrap_or_else(|_| "en".to_string());
    set_locale(&locale);
}

/// Normalize locale code to a supported one
///
/// - ko-KR, ko_KR, korean -> ko
/// - anything else -> en
fn normalize_locale(locale: &str) -> &'static str {
    let lower = locale.to_lowercase();

    if lower.starts_with("ko") || lower == "korean" {
        "ko"
    } else {
        "en"
    }
}

/// Translate a key with optional parameters
///
/// Re-export of `rust_i18n::t!`.
#[doc(inline)]
pub use rust_i18n::t;
