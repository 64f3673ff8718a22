// Core modules implementing archive reading, extraction, resolution, and error modeling.
pub mod archive;
pub mod error;
pub mod extract;
pub mod group;
pub mod layout;
pub mod manifest;
pub mod resolver;

#[cfg(test)]
pub(crate) mod test_support;
