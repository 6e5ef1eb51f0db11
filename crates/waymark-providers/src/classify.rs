/// Error taxonomy narrowed to the subset a `Provider` call can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorClass {
    RateLimit,
    ContextOverflow,
    Timeout,
    Transient,
    Fatal,
}

/// Classifies a provider error message, separating rate-limit,
/// context-overflow, and timeout so callers can react differently to each.
pub fn classify_provider_error(message: &str) -> ProviderErrorClass {
    let m = message.to_lowercase();
    if m.contains("rate limit") || m.contains("429") || m.contains("too many requests") {
        ProviderErrorClass::RateLimit
    } else if m.contains("context") && (m.contains("overflow") || m.contains("too long") || m.contains("maximum context")) {
        ProviderErrorClass::ContextOverflow
    } else if m.contains("timeout") || m.contains("timed out") {
        ProviderErrorClass::Timeout
    } else if m.contains("500") || m.contains("502") || m.contains("503") || m.contains("connection reset") {
        ProviderErrorClass::Transient
    } else {
        ProviderErrorClass::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit() {
        assert_eq!(classify_provider_error("HTTP 429 too many requests"), ProviderErrorClass::RateLimit);
    }

    #[test]
    fn classifies_context_overflow() {
        assert_eq!(
            classify_provider_error("maximum context length exceeded"),
            ProviderErrorClass::ContextOverflow
        );
    }

    #[test]
    fn classifies_timeout() {
        assert_eq!(classify_provider_error("request timed out"), ProviderErrorClass::Timeout);
    }

    #[test]
    fn unrecognized_errors_are_fatal() {
        assert_eq!(classify_provider_error("invalid api key"), ProviderErrorClass::Fatal);
    }
}
