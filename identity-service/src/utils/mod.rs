pub mod password;
pub mod token;
pub mod validation;

pub use password::{
    hash_password, verify_dummy_password, verify_password, Password, PasswordHashString,
};
pub use token::{generate_opaque_token, generate_state};
pub use validation::ValidatedJson;
