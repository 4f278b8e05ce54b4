//! Temporary credentials for admin-provisioned identities.

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

pub const TEMP_PASSWORD_LEN: usize = 16;

/// Minimum password length accepted by the identity service.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Random alphanumeric password with at least one digit, one lowercase and
/// one uppercase letter.
pub fn generate_temporary_password() -> String {
    generate_with(&mut rand::thread_rng())
}

fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    loop {
        let candidate = Alphanumeric.sample_string(rng, TEMP_PASSWORD_LEN);
        if meets_policy(&candidate) {
            return candidate;
        }
    }
}

fn meets_policy(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_passwords_differ() {
        assert_ne!(generate_temporary_password(), generate_temporary_password());
    }

    proptest! {
        #[test]
        fn generated_password_meets_policy(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let password = generate_with(&mut rng);
            prop_assert_eq!(password.len(), TEMP_PASSWORD_LEN);
            prop_assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
            prop_assert!(meets_policy(&password));
        }
    }
}
