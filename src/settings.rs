//! Association parameters: authentication, PDU sizing and the ciphering block.

use crate::association::{ApplicationContext, Authentication};
use crate::error::{Error, Result};
use crate::security::SecurityControl;

/// Default maximum PDU size proposed by the client.
pub const DEFAULT_MAX_PDU_SIZE: u16 = 1024;

/// Keys and counters for glo-ciphered associations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphering {
    /// Protection applied to every ciphered PDU; [`SecurityControl::NONE`]
    /// disables ciphering altogether.
    pub security: SecurityControl,
    /// This client's system title, sent as calling-AP-title.
    pub system_title: Option<[u8; 8]>,
    pub unicast_key: [u8; 16],
    pub authentication_key: [u8; 16],
    /// Session key carried inside the ciphered initiate-request.
    pub dedicated_key: Option<[u8; 16]>,
    /// Next counter value to use; strictly increasing, never reset.
    pub invocation_counter: u32,
}

impl Ciphering {
    /// No protection, no keys.
    pub fn none() -> Self {
        Self {
            security: SecurityControl::NONE,
            system_title: None,
            unicast_key: [0; 16],
            authentication_key: [0; 16],
            dedicated_key: None,
            invocation_counter: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.security.is_none()
    }
}

/// Everything `associate()` needs to build the AARQ and protect the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub authentication: Authentication,
    pub password: Vec<u8>,
    pub max_pdu_size: u16,
    pub ciphering: Ciphering,
}

impl Settings {
    /// Public client: no authentication, no ciphering.
    pub fn without_authentication() -> Self {
        Self {
            authentication: Authentication::None,
            password: Vec::new(),
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            ciphering: Ciphering::none(),
        }
    }

    /// Low-level security: clear-text password in the AARQ.
    pub fn with_low_authentication(password: Vec<u8>) -> Result<Self> {
        if password.is_empty() {
            return Err(Error::InvalidParameter("low authentication requires a password"));
        }
        Ok(Self { authentication: Authentication::Low, password, ..Self::without_authentication() })
    }

    /// Low-level security plus glo-ciphered PDUs.
    pub fn with_low_authentication_and_ciphering(
        password: Vec<u8>,
        ciphering: Ciphering,
    ) -> Result<Self> {
        if password.is_empty() {
            return Err(Error::InvalidParameter("low authentication requires a password"));
        }
        if !ciphering.is_enabled() {
            return Err(Error::InvalidParameter("ciphering block enables no protection"));
        }
        if ciphering.system_title.is_none() {
            return Err(Error::InvalidParameter("ciphering requires a system title"));
        }
        Ok(Self {
            authentication: Authentication::Low,
            password,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            ciphering,
        })
    }

    /// The application context the AARQ will propose.
    pub fn application_context(&self) -> ApplicationContext {
        if self.ciphering.is_enabled() || self.ciphering.system_title.is_some() {
            ApplicationContext::LogicalNameWithCiphering
        } else {
            ApplicationContext::LogicalName
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::without_authentication();
        assert_eq!(settings.authentication, Authentication::None);
        assert_eq!(settings.max_pdu_size, DEFAULT_MAX_PDU_SIZE);
        assert!(!settings.ciphering.is_enabled());
        assert_eq!(settings.application_context(), ApplicationContext::LogicalName);
    }

    #[test]
    fn test_low_authentication_requires_password() {
        assert!(Settings::with_low_authentication(Vec::new()).is_err());
        let settings = Settings::with_low_authentication(b"12345678".to_vec()).unwrap();
        assert_eq!(settings.authentication, Authentication::Low);
    }

    #[test]
    fn test_ciphering_validation() {
        let mut ciphering = Ciphering::none();
        assert!(
            Settings::with_low_authentication_and_ciphering(b"pw".to_vec(), ciphering.clone())
                .is_err()
        );

        ciphering.security = SecurityControl::AUTHENTICATION | SecurityControl::ENCRYPTION;
        assert!(
            Settings::with_low_authentication_and_ciphering(b"pw".to_vec(), ciphering.clone())
                .is_err(),
            "system title missing"
        );

        ciphering.system_title = Some([1, 2, 3, 4, 5, 6, 7, 8]);
        let settings =
            Settings::with_low_authentication_and_ciphering(b"pw".to_vec(), ciphering).unwrap();
        assert_eq!(settings.application_context(), ApplicationContext::LogicalNameWithCiphering);
    }
}
