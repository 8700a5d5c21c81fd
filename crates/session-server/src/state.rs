use session_core::ReconcilerHealth;

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub reconciler: ReconcilerHealth,
}

impl AppState {
    pub fn new(service_name: impl Into<String>, reconciler: ReconcilerHealth) -> Self {
        Self {
            service_name: service_name.into(),
            reconciler,
        }
    }
}
