use rand::RngCore;
use rand::rngs::OsRng;

/// Random bytes in an order id nonce.
const ORDER_NONCE_SIZE: usize = 8;
/// Random bytes in a locally generated subscription key.
const SUB_KEY_SIZE: usize = 16;

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates the nonce segment of an order correlation id.
pub fn order_nonce() -> String {
    random_hex::<ORDER_NONCE_SIZE>()
}

/// Generates a subscription key when the authority did not return one.
pub fn subscription_key() -> String {
    random_hex::<SUB_KEY_SIZE>()
}
