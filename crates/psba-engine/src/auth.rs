//! Local credential checks
//!
//! A failed check yields a reject reason rather than an error: the reason
//! later becomes the Reply-Message of an Access-Reject or selects the reject
//! profile.

use crate::config::AuthMode;
use crate::provision::{ClientRecord, SpecialUsers};
use radius_model::Packet;
use tracing::debug;

const USER_PASSWORD: &str = "User-Password";

pub struct LocalAuthenticator<'a> {
    special_users: &'a SpecialUsers,
}

impl<'a> LocalAuthenticator<'a> {
    pub fn new(special_users: &'a SpecialUsers) -> Self {
        LocalAuthenticator { special_users }
    }

    /// Check the request credentials, returning the reject reason on failure
    ///
    /// `user_name` is the normalized (lower-cased) request user name.
    pub fn check(
        &self,
        mode: AuthMode,
        request: &Packet,
        user_name: &str,
        record: &ClientRecord,
    ) -> Option<String> {
        let password = request.get_password_avp(USER_PASSWORD).unwrap_or_default();

        match mode {
            AuthMode::Provision => {
                // empty strings are how the store reports unprovisioned fields
                let provisioned_login = record.user_name.as_deref().filter(|s| !s.is_empty());
                let provisioned_password = record.password.as_deref().filter(|s| !s.is_empty());
                let login = provisioned_login.unwrap_or(user_name);
                let mut reason = None;

                match provisioned_password {
                    Some(expected) if expected != password => {
                        debug!(user = %login, "Incorrect password");
                        reason = Some(format!("authorization rejected (provision) for {}", login));
                    }
                    Some(_) => {}
                    None => debug!("Not verifying unprovisioned password"),
                }

                match provisioned_login {
                    Some(provisioned) if provisioned.to_lowercase() != user_name => {
                        debug!(user = %login, "Incorrect login");
                        reason = Some(format!("login unmatch (provision) for {}", login));
                    }
                    Some(_) => {}
                    None => debug!("Not verifying unprovisioned login"),
                }

                reason
            }
            AuthMode::File => match self.special_users.get(user_name) {
                Some(entry) if entry.password == password => None,
                Some(_) => {
                    debug!(user = %user_name, "Incorrect password");
                    Some(format!("Authorization rejected (file) for {}", user_name))
                }
                None => {
                    debug!(user = %user_name, "Not found in special users");
                    Some(format!("{} not found", user_name))
                }
            },
            AuthMode::None => None,
        }
    }
}
