//! The protocol's trivial login-string "encryption": every byte XORed with
//! 0xFF. The transform is its own inverse.

pub fn obfuscate(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ 0xFF).collect()
}
