//! Parsing of interactive input and rendering of cache outcomes

use tiered_image_cache::CacheEvent;
use url::Url;

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Load(String),
    Clear,
    Stats,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_line(line: &str) -> Command {
    let line = line.trim();
    match line {
        "" => Command::Empty,
        "clear" => Command::Clear,
        "stats" => Command::Stats,
        "quit" | "exit" => Command::Quit,
        _ => match validate_url(line) {
            Ok(()) => Command::Load(line.to_string()),
            Err(msg) => Command::Invalid(msg),
        },
    }
}

/// Only absolute http(s) URLs are handed to the cache
pub fn validate_url(input: &str) -> Result<(), String> {
    let url = Url::parse(input).map_err(|e| format!("Invalid URL {}: {}", input, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err("URL must start with http:// or https://".to_string()),
    }
}

pub fn render_event(event: &CacheEvent) -> String {
    match event {
        CacheEvent::Ready { image, url, source } => format!(
            "Loaded: {} ({}x{} {:?}, {})",
            url,
            image.width(),
            image.height(),
            image.format,
            source
        ),
        CacheEvent::Failed { url, reason } => format!("Error loading {}: {}", url, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("  clear "), Command::Clear);
        assert_eq!(parse_line("stats"), Command::Stats);
        assert_eq!(parse_line("exit"), Command::Quit);
        assert_eq!(parse_line("   "), Command::Empty);
        assert_eq!(
            parse_line("https://example.com/cat.png"),
            Command::Load("https://example.com/cat.png".to_string())
        );
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(validate_url("http://example.com/a.jpg").is_ok());
        assert!(validate_url("ftp://example.com/a.jpg").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(matches!(parse_line("example.com/a.png"), Command::Invalid(_)));
    }

    #[test]
    fn test_render_failure() {
        let event = CacheEvent::Failed {
            url: "https://example.com/a.png".to_string(),
            reason: "invalid data".to_string(),
        };
        assert_eq!(
            render_event(&event),
            "Error loading https://example.com/a.png: invalid data"
        );
    }
}
