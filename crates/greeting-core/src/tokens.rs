use uuid::Uuid;

pub const PUBLIC_ID_LEN: usize = 12;
pub const OWNER_TOKEN_LEN: usize = 64;

/// Short share-link slug.
pub fn generate_public_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(PUBLIC_ID_LEN);
    id
}

/// Owner capability. Returned once on create and never stored in clear.
pub fn generate_owner_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

pub fn hash_owner_token(token: &str) -> String {
    hash_secret(token)
}

/// Hex digest of a bearer secret. Secrets are compared by digest, never in clear.
pub fn hash_secret(secret: &str) -> String {
    blake3::hash(secret.trim().as_bytes()).to_hex().to_string()
}
