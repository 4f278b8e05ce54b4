use std::sync::Arc;

use alumni_core::AdminService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AdminService>,
    pub service_name: Arc<str>,
    /// Bearer token required on `/api/admin/*`; `None` leaves them open.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: AdminService, service_name: &str, admin_token: Option<&str>) -> Self {
        Self {
            service: Arc::new(service),
            service_name: Arc::from(service_name),
            admin_token: admin_token.map(Arc::from),
        }
    }
}
