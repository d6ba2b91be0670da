//! Admin account configuration loaded from environment variables.
//!
//! The admin account is created on startup if no administrator exists. The
//! password hash is produced by the auth layer; it is stored as given.

use crate::core::user::AdminAccount;

/// Reads the admin bootstrap account from the environment.
///
/// Requires `ADMIN_USERNAME`, `ADMIN_EMAIL` and `ADMIN_PASSWORD_HASH`;
/// `ADMIN_PHONE` is optional.
///
/// # Returns
///
/// `Some(account)` when all required variables are set, `None` otherwise.
#[must_use]
pub fn admin_account_from_env() -> Option<AdminAccount> {
    admin_account_from(|key| std::env::var(key).ok())
}

fn admin_account_from<F>(lookup: F) -> Option<AdminAccount>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    Some(AdminAccount {
        username: non_empty("ADMIN_USERNAME")?,
        email: non_empty("ADMIN_EMAIL")?,
        password_hash: non_empty("ADMIN_PASSWORD_HASH")?,
        phone_number: non_empty("ADMIN_PHONE"),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_admin_account_with_all_fields() {
        let account = admin_account_from(lookup_from(&[
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_EMAIL", "admin@parking.test"),
            ("ADMIN_PASSWORD_HASH", "hash"),
            ("ADMIN_PHONE", "0000000000"),
        ]))
        .unwrap();

        assert_eq!(account.username, "admin");
        assert_eq!(account.email, "admin@parking.test");
        assert_eq!(account.password_hash, "hash");
        assert_eq!(account.phone_number.as_deref(), Some("0000000000"));
    }

    #[test]
    fn test_admin_account_phone_is_optional() {
        let account = admin_account_from(lookup_from(&[
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_EMAIL", "admin@parking.test"),
            ("ADMIN_PASSWORD_HASH", "hash"),
        ]))
        .unwrap();
        assert!(account.phone_number.is_none());
    }

    #[test]
    fn test_admin_account_missing_required_field() {
        let account = admin_account_from(lookup_from(&[
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_PASSWORD_HASH", "hash"),
        ]));
        assert!(account.is_none());

        let blank = admin_account_from(lookup_from(&[
            ("ADMIN_USERNAME", "  "),
            ("ADMIN_EMAIL", "admin@parking.test"),
            ("ADMIN_PASSWORD_HASH", "hash"),
        ]));
        assert!(blank.is_none());
    }
}
