//! Connection options.

use url::Url;

use crate::error::Error;

/// Connection options for PostgreSQL.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `"127.0.0.1"`
    pub host: String,

    /// Port number for the PostgreSQL server.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Username for authentication.
    ///
    /// Default: `""`
    pub user: String,

    /// Password for cleartext and MD5 authentication.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Database name to use.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Application name to report to the server.
    ///
    /// Default: `None`
    pub application_name: Option<String>,

    /// Additional startup parameters.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,

    /// Log every inbound and outbound frame at debug level.
    ///
    /// Default: `false`
    pub trace_protocol: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: String::new(),
            password: None,
            database: None,
            application_name: None,
            params: Vec::new(),
            trace_protocol: false,
        }
    }
}

impl Opts {
    /// Startup message parameters in the order they are sent.
    pub fn startup_params(&self) -> Vec<(&str, &str)> {
        let mut params = vec![("user", self.user.as_str()), ("client_encoding", "UTF8")];
        if let Some(database) = &self.database {
            params.push(("database", database));
        }
        if let Some(application_name) = &self.application_name {
            params.push(("application_name", application_name));
        }
        for (name, value) in &self.params {
            params.push((name, value));
        }
        params
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database][?param1=value1&param2=value2&..]`
    ///
    /// Accepted schemes: `postgres`, `postgresql`, `pg`, `pgsql`.
    ///
    /// Supported query parameters:
    /// - `application_name`: application name
    /// - `trace_protocol`: true/True/1/yes/on or false/False/0/no/off
    ///
    /// Any other query parameter is sent as a startup parameter.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "postgresql", "pg", "pgsql"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let defaults = Opts::default();
        let mut opts = Opts {
            host: url.host_str().unwrap_or(&defaults.host).to_string(),
            port: url.port().unwrap_or(defaults.port),
            user: url.username().to_string(),
            password: url.password().map(|s| s.to_string()),
            database: url.path().strip_prefix('/').and_then(|s| {
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            }),
            ..defaults
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "application_name" => {
                    opts.application_name = Some(value.to_string());
                }
                "trace_protocol" => {
                    opts.trace_protocol = match value.as_ref() {
                        "true" | "True" | "1" | "yes" | "on" => true,
                        "false" | "False" | "0" | "no" | "off" => false,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid trace_protocol: {}",
                                value
                            )));
                        }
                    };
                }
                _ => {
                    opts.params.push((key.to_string(), value.to_string()));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}

impl TryFrom<String> for Opts {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}
