//! Helpers shared by unit tests. The files live with the integration-test
//! support so both suites use one copy.

#[path = "../../tests/support/fits.rs"]
mod fits;
#[path = "../../tests/support/socket_guard.rs"]
pub mod socket_guard;

pub use fits::{FitsBuilder, minimal_fits};

#[cfg(test)]
mod tests {
    use crate::integrity::fits::{BLOCK_SIZE, CARD_SIZE};

    #[test]
    fn test_fixture_layout_matches_validator() {
        assert_eq!(super::fits::layout(), (BLOCK_SIZE, CARD_SIZE));
    }
}
