// Read-only adapters that normalize external tool output.

pub mod kubectl;
