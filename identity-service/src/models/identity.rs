//! External identity as reported by a federation provider.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ExternalIdentity {
    /// Lowercased domain part of the email, if it has one.
    pub fn email_domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_lowercase())
            .filter(|domain| !domain.is_empty())
    }

    /// Display name, falling back to the email's local part.
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str, name: Option<&str>) -> ExternalIdentity {
        ExternalIdentity {
            subject: "42".to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            avatar_url: None,
        }
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(
            identity("dev@Acme.COM", None).email_domain().as_deref(),
            Some("acme.com")
        );
        assert_eq!(identity("no-at-sign", None).email_domain(), None);
        assert_eq!(identity("trailing@", None).email_domain(), None);
    }

    #[test]
    fn test_display_name_falls_back_to_local_part() {
        assert_eq!(identity("dev@acme.com", None).display_name(), "dev");
        assert_eq!(identity("dev@acme.com", Some("  ")).display_name(), "dev");
        assert_eq!(identity("dev@acme.com", Some("Dev Eloper")).display_name(), "Dev Eloper");
    }
}
