//! WeCom errcode knowledge base
//!
//! Purpose
//! - Map well-known global errcode values to categories and short hints
//! - Decide which codes mean "the cached access_token is no longer valid"
//! - Detect common JSON format warnings in errmsg
//!
//! Notes
//! - Program logic depends on `errcode`, never on `errmsg`; the latter is diagnostic text.
//! - Only [`TOKEN_INVALID_CODES`] trigger the client's evict-and-retry path. Every other
//!   nonzero code is surfaced to the caller unchanged.
//! - Unknown codes are categorized as `Unknown` with a conservative policy: no retry,
//!   no token refresh, and a generic hint directing to the official docs.

/// access_token expired.
pub const ERRCODE_TOKEN_EXPIRED: i64 = 42001;
/// access_token invalid.
pub const ERRCODE_TOKEN_INVALID: i64 = 40014;

/// Codes that make the client drop its cached token and retry once.
pub const TOKEN_INVALID_CODES: [i64; 2] = [ERRCODE_TOKEN_EXPIRED, ERRCODE_TOKEN_INVALID];

/// High-level classification for an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// errcode = 0
    Success,
    /// System busy or rate limited; retry later
    TemporarySystem,
    /// The access_token is expired or invalid; refetch it
    Token,
    /// corpid/secret/agentid/IP problems; fix configuration
    Credential,
    /// Invalid parameter or malformed request body
    InvalidParam,
    /// Recipient list empty or all recipients invalid
    Recipient,
    /// OAuth code problems
    OAuth,
    /// Unknown/Uncategorized
    Unknown,
}

/// Recommendation for retry strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAdvice {
    /// Whether to retry at all
    pub retry: bool,
    /// First backoff in milliseconds (if retry)
    pub initial_backoff_ms: Option<u64>,
    /// Max retries suggested
    pub max_retries: Option<u8>,
    /// Short reason for the advice
    pub reason: &'static str,
}

impl RetryAdvice {
    pub const NO: RetryAdvice = RetryAdvice {
        retry: false,
        initial_backoff_ms: None,
        max_retries: None,
        reason: "do not retry",
    };
    pub const TRANSIENT_3: RetryAdvice = RetryAdvice {
        retry: true,
        initial_backoff_ms: Some(300),
        max_retries: Some(3),
        reason: "transient/system busy; retry with backoff",
    };
    pub const REFRESH_ONCE: RetryAdvice = RetryAdvice {
        retry: true,
        initial_backoff_ms: None,
        max_retries: Some(1),
        reason: "token invalid; refetch access_token and retry once",
    };
}

/// A compact, friendly explanation for an errcode.
#[derive(Debug, Clone)]
pub struct ErrorHelp {
    pub code: i64,
    pub category: ErrorCategory,
    /// Short, stable summary for the code
    pub summary: &'static str,
    /// Actionable hint for mitigation
    pub hint: &'static str,
    /// Retry policy recommendation
    pub retry: RetryAdvice,
    /// Whether the cached access_token must be dropped
    pub refresh_token: bool,
}

/// True for the two codes meaning "your token is no longer acceptable".
pub fn is_token_invalid(code: i64) -> bool {
    TOKEN_INVALID_CODES.contains(&code)
}

/// Returns a friendly hint for a known errcode.
pub fn hint_for(code: i64) -> &'static str {
    match code {
        -1 => "System busy; retry with backoff (<=3 attempts).",
        0 => "Success.",
        40001 => "Invalid corpsecret; use the Secret of the application identified by agentid.",
        40013 => "Invalid corpid; the corpid starts with 'ww' and is shown under 'My Company'.",
        40014 => "Invalid access_token; the client refetches it automatically once.",
        42001 => "access_token expired; the client refetches it automatically once.",
        41001 => "Missing access_token parameter.",
        40003 => "Invalid userid; check touser entries exist in the address book.",
        40029 => "Invalid OAuth code; a code is single-use and valid for 5 minutes.",
        40056 => "Invalid agentid; verify the application id matches the secret.",
        44004 => "Text content is empty.",
        45009 => "API call frequency exceeded; slow down and retry later.",
        48002 => "API forbidden; check the application's API permissions.",
        50001 => "redirect_uri domain is not the application's trusted domain.",
        60020 => "Caller IP is not in the application's trusted IP list.",
        81013 => "touser, toparty and totag are all invalid or empty.",
        82001 => "Recipients are outside the application's visible range.",
        _ => "Unknown code; refer to the official docs and logs for details.",
    }
}

/// Classify errcode into a category.
pub fn category_for(code: i64) -> ErrorCategory {
    match code {
        0 => ErrorCategory::Success,
        -1 | 45009 => ErrorCategory::TemporarySystem,
        40014 | 42001 | 41001 => ErrorCategory::Token,
        40001 | 40013 | 40056 | 48002 | 60020 => ErrorCategory::Credential,
        40003 | 44004 => ErrorCategory::InvalidParam,
        81013 | 82001 => ErrorCategory::Recipient,
        40029 | 50001 => ErrorCategory::OAuth,
        _ => ErrorCategory::Unknown,
    }
}

/// Whether to retry, and how.
pub fn should_retry(code: i64) -> RetryAdvice {
    match code {
        -1 | 45009 => RetryAdvice::TRANSIENT_3,
        c if is_token_invalid(c) => RetryAdvice::REFRESH_ONCE,
        _ => RetryAdvice::NO,
    }
}

/// Whether the cached access_token should be dropped for this code.
pub fn should_refresh_token(code: i64) -> bool {
    is_token_invalid(code)
}

/// Build a structured help object for a given errcode.
pub fn lookup(code: i64) -> ErrorHelp {
    let summary = match code {
        -1 => "System busy",
        0 => "Success",
        40001 => "Invalid corpsecret",
        40013 => "Invalid corpid",
        40014 => "Invalid access_token",
        42001 => "access_token expired",
        41001 => "Missing access_token",
        40003 => "Invalid userid",
        40029 => "Invalid OAuth code",
        40056 => "Invalid agentid",
        44004 => "Empty text content",
        45009 => "API frequency limit",
        48002 => "API forbidden",
        50001 => "Untrusted redirect_uri",
        60020 => "IP not whitelisted",
        81013 => "No valid recipient",
        82001 => "Recipients out of visible range",
        _ => "Unknown error",
    };

    ErrorHelp {
        code,
        category: category_for(code),
        summary,
        hint: hint_for(code),
        retry: should_retry(code),
        refresh_token: should_refresh_token(code),
    }
}

/// Produce a concise, human-readable explanation string.
pub fn explain(errcode: i64, errmsg: &str) -> String {
    let help = lookup(errcode);
    let mut parts = vec![
        format!("errcode={} ({:?})", help.code, help.category),
        help.summary.to_string(),
        format!("hint: {}", help.hint),
    ];

    if help.retry.retry {
        let mut retry_line = String::from("retry: yes");
        if let Some(ms) = help.retry.initial_backoff_ms {
            retry_line.push_str(&format!(", initial_backoff_ms={}", ms));
        }
        if let Some(n) = help.retry.max_retries {
            retry_line.push_str(&format!(", max_retries={}", n));
        }
        retry_line.push_str(&format!(" ({})", help.retry.reason));
        parts.push(retry_line);
    } else {
        parts.push(format!("retry: no ({})", help.retry.reason));
    }

    if contains_wrong_json_format(errmsg) {
        parts.push(
            "detected: Warning: wrong json format. Please validate JSON request body.".to_string(),
        );
    }

    parts.join(" | ")
}

/// Detect "Warning: wrong json format." substring in errmsg (case-insensitive).
pub fn contains_wrong_json_format(errmsg: &str) -> bool {
    errmsg
        .to_ascii_lowercase()
        .contains("warning: wrong json format")
}

/// Return true if this error looks temporary (safe to retry with backoff).
pub fn is_temporary(code: i64) -> bool {
    matches!(category_for(code), ErrorCategory::TemporarySystem)
}

/// Return true if the recipients of a message were rejected.
pub fn is_recipient_issue(code: i64) -> bool {
    matches!(category_for(code), ErrorCategory::Recipient)
}

/// Return true if corpid/secret/agentid need fixing.
pub fn is_credential_issue(code: i64) -> bool {
    matches!(category_for(code), ErrorCategory::Credential)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_two_codes_invalidate_the_token() {
        assert!(is_token_invalid(42001));
        assert!(is_token_invalid(40014));
        assert!(!is_token_invalid(0));
        assert!(!is_token_invalid(40001));
        assert!(!is_token_invalid(41001));
        assert!(!is_token_invalid(301000));
    }

    #[test]
    fn retry_advice_matches_category() {
        assert_eq!(should_retry(-1), RetryAdvice::TRANSIENT_3);
        assert_eq!(should_retry(42001), RetryAdvice::REFRESH_ONCE);
        assert_eq!(should_retry(81013), RetryAdvice::NO);
        assert_eq!(should_retry(123456), RetryAdvice::NO);
    }

    #[test]
    fn lookup_unknown_code_is_conservative() {
        let help = lookup(301000);
        assert_eq!(help.category, ErrorCategory::Unknown);
        assert!(!help.refresh_token);
        assert!(!help.retry.retry);
    }

    #[test]
    fn explain_flags_wrong_json_format() {
        let s = explain(40003, "Warning: wrong json format. invalid userid");
        assert!(s.contains("errcode=40003 (InvalidParam)"));
        assert!(s.contains("detected: Warning: wrong json format."));
        assert!(!explain(0, "ok").contains("detected"));
    }
}
