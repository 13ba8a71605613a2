pub mod address;

pub use address::{AddressData, RelayAddress, ADDRESS_BYTES, MAX_ADDRESS_STRING_LENGTH};
