pub mod encrypt;
pub mod serve;
