pub mod operation;

pub use operation::Operation;

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

/// Keys travel as the decimal rendering of their numeric id.
pub fn encode_key(id: u64) -> Key {
    id.to_string().into_bytes()
}
