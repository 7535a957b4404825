//! Configuration validation module

use regex::Regex;

use crate::config::{
    Config, FiltersConfig, GitHubConfig, LoggingConfig, OvalConfig, OvalMode, ReportConfig,
    ServerConfig, WpScanConfig,
};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("OVAL configuration error: {message}")]
    Oval { message: String },

    #[error("API configuration error: {message}")]
    Api { message: String },

    #[error("Filter configuration error: {message}")]
    Filter { message: String },

    #[error("Report configuration error: {message}")]
    Report { message: String },

    #[error("Server configuration error: {message}")]
    Server { message: String },
}

impl ValidationError {
    pub fn oval(message: impl Into<String>) -> Self {
        Self::Oval {
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    pub fn filter(message: impl Into<String>) -> Self {
        Self::Filter {
            message: message.into(),
        }
    }

    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Validate for OvalConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.mode == OvalMode::Http && !is_http_url(&self.url) {
            return Err(ValidationError::oval(format!(
                "OVAL url must start with http:// or https://, got: {}",
                self.url
            )));
        }

        if self.concurrency == 0 {
            return Err(ValidationError::oval(
                "OVAL concurrency must be greater than 0",
            ));
        }

        if self.timeout_seconds == 0 || self.request_timeout_seconds == 0 {
            return Err(ValidationError::oval(
                "OVAL timeouts must be greater than 0 seconds",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ValidationError::oval(
                "OVAL retry max_attempts must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for GitHubConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !is_http_url(&self.graphql_url) {
            return Err(ValidationError::api(format!(
                "GitHub graphql_url must start with http:// or https://, got: {}",
                self.graphql_url
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(ValidationError::api(
                "GitHub timeout must be greater than 0 seconds",
            ));
        }

        if self.page_size == 0 || self.page_size > 100 {
            return Err(ValidationError::api(format!(
                "GitHub page_size must be in range 1-100, got {}",
                self.page_size
            )));
        }

        Ok(())
    }
}

impl Validate for WpScanConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !is_http_url(&self.base_url) {
            return Err(ValidationError::api(format!(
                "WPScan base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(ValidationError::api(
                "WPScan timeout must be greater than 0 seconds",
            ));
        }

        Ok(())
    }
}

impl Validate for FiltersConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=10.0).contains(&self.cvss_score_over) {
            return Err(ValidationError::filter(format!(
                "cvss_score_over must be in range 0-10, got {}",
                self.cvss_score_over
            )));
        }

        Ok(())
    }
}

impl Validate for ReportConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.lang != "en" && self.lang != "ja" {
            return Err(ValidationError::report(format!(
                "lang must be en or ja, got: {}",
                self.lang
            )));
        }

        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.format != "json" && self.format != "pretty" {
            return Err(ValidationError::report(format!(
                "logging format must be json or pretty, got: {}",
                self.format
            )));
        }

        Ok(())
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let patterns = self.ignore_pkgs_regexp.iter().chain(
            self.containers
                .values()
                .flat_map(|c| c.ignore_pkgs_regexp.iter()),
        );
        for pattern in patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(ValidationError::server(format!(
                    "invalid ignore_pkgs_regexp {:?}: {}",
                    pattern, e
                )));
            }
        }

        for repo in self.github_repos.keys() {
            if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
                return Err(ValidationError::server(format!(
                    "GitHub repository must be owner/repo, got: {}",
                    repo
                )));
            }
        }

        Ok(())
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.oval.validate()?;
        self.github.validate()?;
        self.wpscan.validate()?;
        self.filters.validate()?;
        self.report.validate()?;
        self.logging.validate()?;
        for (name, server) in &self.servers {
            server
                .validate()
                .map_err(|e| ValidationError::server(format!("{}: {}", name, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitHubRepoConfig;

    #[test]
    fn test_oval_config_validation() {
        let valid = OvalConfig::default();
        assert!(valid.validate().is_ok());

        // Offline mode does not need a URL
        let offline = OvalConfig {
            url: String::new(),
            ..valid.clone()
        };
        assert!(offline.validate().is_ok());

        let invalid = OvalConfig {
            mode: OvalMode::Http,
            url: "oval.internal".to_string(),
            ..valid.clone()
        };
        assert!(invalid.validate().is_err());

        let invalid = OvalConfig {
            timeout_seconds: 0,
            ..valid
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_filters_config_validation() {
        let valid = FiltersConfig {
            cvss_score_over: 7.0,
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let invalid = FiltersConfig {
            cvss_score_over: 11.0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_server_config_validation() {
        let valid = ServerConfig {
            ignore_pkgs_regexp: vec!["^kernel-.*".to_string()],
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let invalid = ServerConfig {
            ignore_pkgs_regexp: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let mut invalid = ServerConfig::default();
        invalid
            .github_repos
            .insert("acme".to_string(), GitHubRepoConfig::default());
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_report_lang_validation() {
        let invalid = ReportConfig {
            lang: "fr".to_string(),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
