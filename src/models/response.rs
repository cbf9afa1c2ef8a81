use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wraps `data` in a successful envelope.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
