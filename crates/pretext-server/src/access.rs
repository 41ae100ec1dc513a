//! Where the preview server listens and the URL readers should open.

use std::fmt;
use std::fs;
use std::net::UdpSocket;
use std::path::Path;
use std::str::FromStr;

/// Project metadata file present inside CoCalc projects.
pub const COCALC_INFO: &str = "/home/user/.smc/info.json";

/// Who may connect to the preview server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Only this machine.
    #[default]
    Private,
    /// Anyone on the network.
    Public,
}

impl FromStr for Access {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Access::Private),
            "public" => Ok(Access::Public),
            other => Err(format!("unknown access '{}'; expected public or private", other)),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Private => "private",
            Access::Public => "public",
        })
    }
}

/// Hosted environments that proxy the preview port under their own URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Cocalc { project_id: String },
    Codespaces { name: String, domain: String },
    Local,
}

impl Environment {
    /// Inspect the current machine.
    pub fn detect() -> Self {
        if let Some(project_id) = cocalc_project_id(Path::new(COCALC_INFO)) {
            return Environment::Cocalc { project_id };
        }
        let name = std::env::var("CODESPACE_NAME").ok();
        let domain = std::env::var("GITHUB_CODESPACES_PORT_FORWARDING_DOMAIN").ok();
        match (name, domain) {
            (Some(name), Some(domain)) if !name.is_empty() && !domain.is_empty() => {
                Environment::Codespaces { name, domain }
            }
            _ => Environment::Local,
        }
    }
}

/// Project id from a CoCalc `info.json`.
pub fn cocalc_project_id(info: &Path) -> Option<String> {
    let contents = fs::read_to_string(info).ok()?;
    let json: serde_json::Value = serde_json::from_str(&contents).ok()?;
    json.get("project_id")?.as_str().map(str::to_string)
}

/// Host the server binds to.
pub fn binding_for_access(access: Access, environment: &Environment) -> &'static str {
    match (access, environment) {
        (Access::Public, _) | (_, Environment::Cocalc { .. }) => "0.0.0.0",
        _ => "localhost",
    }
}

/// URL for reaching a server on `port`.
pub fn url_for_access(access: Access, port: u16, environment: &Environment) -> String {
    match environment {
        Environment::Cocalc { project_id } => {
            format!("https://cocalc.com/{}/server/{}/", project_id, port)
        }
        Environment::Codespaces { name, domain } => format!("https://{}-{}.{}", name, port, domain),
        Environment::Local if access == Access::Public => {
            format!("http://{}:{}", local_ip().unwrap_or_else(|| "0.0.0.0".to_string()), port)
        }
        Environment::Local => format!("http://localhost:{}", port),
    }
}

/// Address of the interface used for outbound traffic. Nothing is sent.
fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn parses_access() {
        assert_eq!("PUBLIC".parse::<Access>().unwrap(), Access::Public);
        assert!("everyone".parse::<Access>().is_err());
    }

    #[test]
    fn bindings() {
        let cocalc = Environment::Cocalc {
            project_id: "abc".to_string(),
        };

        assert_eq!(binding_for_access(Access::Private, &Environment::Local), "localhost");
        assert_eq!(binding_for_access(Access::Public, &Environment::Local), "0.0.0.0");
        assert_eq!(binding_for_access(Access::Private, &cocalc), "0.0.0.0");
    }

    #[test]
    fn urls_per_environment() {
        let cocalc = Environment::Cocalc {
            project_id: "abc".to_string(),
        };
        let codespace = Environment::Codespaces {
            name: "fluffy-space".to_string(),
            domain: "app.github.dev".to_string(),
        };

        assert_eq!(url_for_access(Access::Private, 8128, &Environment::Local), "http://localhost:8128");
        assert_eq!(url_for_access(Access::Private, 8128, &cocalc), "https://cocalc.com/abc/server/8128/");
        assert_eq!(
            url_for_access(Access::Public, 8128, &codespace),
            "https://fluffy-space-8128.app.github.dev"
        );
    }

    #[test]
    fn reads_cocalc_project_id() {
        let temp = tempdir().unwrap();
        let info = temp.path().join("info.json");
        fs::write(&info, r#"{"project_id": "1234-abcd", "other": 1}"#).unwrap();

        assert_eq!(cocalc_project_id(&info), Some("1234-abcd".to_string()));
        assert_eq!(cocalc_project_id(&temp.path().join("missing.json")), None);
    }
}
