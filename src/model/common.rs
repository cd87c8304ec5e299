use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Maximum number of items on a root-to-item path (category → subcategory → subdivision)
pub const MAX_DEPTH: usize = 3;
