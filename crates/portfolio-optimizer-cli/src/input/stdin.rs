use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Parse a piped request from stdin, JSON first and YAML as a fallback.
/// Returns `None` when stdin is a terminal or empty.
pub fn read_stdin<T: DeserializeOwned>() -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    parse_piped(&buffer)
}

fn parse_piped<T: DeserializeOwned>(buffer: &str) -> Result<Option<T>, Box<dyn std::error::Error>> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(Some(value)),
        Err(json_err) => serde_yaml::from_str(trimmed)
            .map(Some)
            .map_err(|_| format!("stdin is neither valid JSON nor YAML: {}", json_err).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_optimizer_core::PortfolioRequest;

    #[test]
    fn test_empty_input_is_none() {
        let parsed: Option<PortfolioRequest> = parse_piped("  \n").unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_yaml_fallback() {
        let parsed: Option<PortfolioRequest> =
            parse_piped("assets:\n  - ticker: TCS.NS\nmethod: min_volatility\n").unwrap();
        assert_eq!(parsed.unwrap().assets[0].ticker, "TCS.NS");
    }

    #[test]
    fn test_garbage_rejected() {
        let parsed: Result<Option<PortfolioRequest>, _> = parse_piped("{not json");
        assert!(parsed.is_err());
    }
}
