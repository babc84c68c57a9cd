//! Authentication and authorization module

pub mod captcha;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use captcha::{ChallengeError, ChallengeVerifier, RecaptchaVerifier};
pub use jwt::{Claims, JwtService, TokenPair};
pub use middleware::{extract_token, jwt_auth_middleware, AuthContext};
pub use password::PasswordHasher;
