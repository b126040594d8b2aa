pub mod time;

/// 21-character url-safe id, used for generation jobs.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// 10-character url-safe id, used for nodes and edges.
pub fn shortid() -> String {
    nanoid::nanoid!(10)
}

/// Fresh document id.
pub fn document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
