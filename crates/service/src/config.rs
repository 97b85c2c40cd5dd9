use clap::Parser;
use tracing::warn;

/// Service configuration, read from flags or the environment.
#[derive(Parser, Debug)]
#[command(name = "feedgrep")]
#[command(about = "Keyword alerting service over Reddit live and archive feeds")]
pub struct Config {
    #[arg(long, env = "POSTGRES_URL")]
    pub postgres_url: String,

    #[arg(long, env = "POST_POLL_INTERVAL_MS")]
    pub post_poll_interval_ms: u64,

    #[arg(long, env = "COMMENT_POLL_INTERVAL_MS")]
    pub comment_poll_interval_ms: u64,

    /// CSV of SOCKS5 proxy URLs; empty means a single direct egress.
    #[arg(long, env = "PROXY_URLS", default_value = "")]
    pub proxy_urls: String,

    #[arg(long, env = "ENABLE_REDDIT_POLLING", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_reddit_polling: bool,

    #[arg(long, env = "ENABLE_ARCTICSHIFT_POLLING", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_arcticshift_polling: bool,

    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: String,

    #[arg(long, env = "SMTP_PORT")]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_FROM")]
    pub smtp_from: String,

    #[arg(long, env = "SMTP_PASSWORD")]
    pub smtp_password: String,

    /// Base URL of the web app, used for keyword-settings links in emails.
    #[arg(long, env = "APP_BASE_URL", default_value = "")]
    pub app_base_url: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn proxy_url_list(&self) -> Vec<String> {
        self.proxy_urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                warn!(
                    "Invalid log level '{}', defaulting to 'info'",
                    self.log_level
                );
                tracing::Level::INFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(proxy_urls: &str, log_level: &str) -> Config {
        Config {
            postgres_url: "postgres://localhost/feedgrep".to_string(),
            post_poll_interval_ms: 2000,
            comment_poll_interval_ms: 2000,
            proxy_urls: proxy_urls.to_string(),
            enable_reddit_polling: true,
            enable_arcticshift_polling: true,
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_from: "feedgrep@example.com".to_string(),
            smtp_password: "password".to_string(),
            app_base_url: String::new(),
            log_level: log_level.to_string(),
        }
    }

    #[test]
    fn proxy_csv_is_trimmed_and_filtered() {
        let config = config_with(" socks5://a:1080 , ,socks5://b:1080,", "info");
        assert_eq!(
            config.proxy_url_list(),
            vec!["socks5://a:1080".to_string(), "socks5://b:1080".to_string()]
        );
        assert!(config_with("", "info").proxy_url_list().is_empty());
    }

    #[test]
    fn log_levels_map_case_insensitively() {
        assert_eq!(config_with("", "DEBUG").tracing_level(), tracing::Level::DEBUG);
        assert_eq!(config_with("", "warn").tracing_level(), tracing::Level::WARN);
        assert_eq!(config_with("", "bogus").tracing_level(), tracing::Level::INFO);
    }
}
