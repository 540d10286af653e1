pub mod csr_keys;
pub mod decrypt;
pub mod inspect;
pub mod onboard;
pub mod sign;
pub mod submit;
