// Test modules for the agent-level components
pub mod test_agent;
