use alloc::vec::Vec;

// AES-CMAC, RFC 4493 section 4
pub const CMAC_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
pub const CMAC_VECTORS: [(&str, &str); 4] = [
    ("", "bb1d6929e95937287fa37d129b756746"),
    (
        "6bc1bee22e409f96e93d7e117393172a",
        "070a16b46b4d4144f79bdd9dd04a287c",
    ),
    (
        "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5130c81c46a35ce411",
        "dfa66747de9ae63030ca32611497c827",
    ),
    (
        "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5130c81c46a35ce411e5fbc1191a0a52eff69f2445df4f9b17ad2b417be66c3710",
        "51f0bebf7e3b9d92fc49741779363cfe",
    ),
];

// Mesh sample data for s1 and k1
pub const S1_INPUT: &[u8] = b"test";
pub const S1_OUTPUT: &str = "b73cefbd641ef2ea598c2b6efb62f79c";
pub const K1_N: &str = "3216d1509884b533248541792b877f98";
pub const K1_SALT: &str = "2ba14ffa0df84a2831938d57d276cab4";
pub const K1_P: &str = "5a09d60797eeb4478aada59db3352a0d";
pub const K1_OUTPUT: &str = "f6ed15a8934afbe7d83e8dcb57fcf5d7";

pub fn hex_array<const N: usize>(hex: &str) -> [u8; N] {
    let mut bytes = [0; N];
    hex::decode_to_slice(hex, &mut bytes).unwrap();
    bytes
}

// Mesh sample data for provisioning without OOB authentication
pub const PROVISIONER_PRIVATE: &str =
    "06a516693c9aa31a6084545d0c5db641b48572b97203ddffb7ac73f7d0457663";
pub const PROVISIONER_PUBLIC: &str = "2c31a47b5779809ef44cb5eaaf5c3e43d5f8faad4a8794cb987e9b03745c78dd919512183898dfbecd52e2408e43871fd021109117bd3ed4eaf8437743715d4f";
pub const DEVICE_PRIVATE: &str =
    "529aa0670d72cd6497502ed473502b037e8803b5c60829a5a3caa219505530ba";
pub const DEVICE_PUBLIC: &str = "f465e43ff23d3f1b9dc7dfc04da8758184dbc966204796eccf0d6cf5e16500cc0201d048bcbbd899eeefc424164e33c201c2b010ca6b4d43a8a155cad8ecb279";
pub const ECDH_SECRET: &str =
    "ab85843a2f6d883f62e5684b38c307335fe6e1945ecd19604105c6f23221eb69";
pub const INVITE: &str = "00";
pub const CAPABILITIES: &str = "0100010000000000000000";
pub const START: &str = "0000000000";
pub const CONFIRMATION_SALT: &str = "5faabe187337c71cc6c973369dcaa79a";
pub const CONFIRMATION_KEY: &str = "e31fe046c68ec339c425fc6629f0336f";
pub const PROVISIONER_RANDOM: &str = "8b19ac31d58b124c946209b5db1021b9";
pub const DEVICE_RANDOM: &str = "55a2a2bca04cd32ff6f346bd0a0c1a3a";
pub const CONFIRMATION_PROVISIONER: &str = "b38a114dfdca1fe153bd2c1e0dc46ac2";
pub const CONFIRMATION_DEVICE: &str = "eeba521c196b52cc2e37aa40329f554e";
pub const PROVISIONING_SALT: &str = "a21c7d45f201cf9489a2fb57145015b4";
pub const SESSION_KEY: &str = "c80253af86b33dfa450bbdb2a191fea3";
pub const SESSION_NONCE: &str = "da7ddbe78b5f62b81d6847487e";
pub const PROVISIONING_DATA: &str =
    "efb2255e6422d330088e09bb015ed707056700010203040b0c";
pub const ENCRYPTED_DATA: &str =
    "d0bd7f4a89a2ff6222af59a90a60ad58acfe3123356f5cec29";
pub const DATA_MIC: &str = "73e0ec50783b10c7";
pub const DEVICE_KEY: &str = "0520adad5e0142aa3e325087b4ec16d8";

/// The 145 byte transcript of the sample provisioning.
pub fn confirmation_inputs() -> Vec<u8> {
    [INVITE, CAPABILITIES, START, PROVISIONER_PUBLIC, DEVICE_PUBLIC]
        .iter()
        .flat_map(|field| hex::decode(field).unwrap())
        .collect()
}
