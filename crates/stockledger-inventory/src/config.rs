/// Tunables for the inventory engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Decimal places kept for derived unit costs (weighted averages, consumed layer costs).
    pub cost_scale: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { cost_scale: 6 }
    }
}
