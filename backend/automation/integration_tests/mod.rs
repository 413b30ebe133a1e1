mod application_tests;
mod error;
