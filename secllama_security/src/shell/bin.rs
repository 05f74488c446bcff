// Binary entry point for secllama-security
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if let Err(e) = secllama_security::shell::run().await {
        eprintln!("secllama-security fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
