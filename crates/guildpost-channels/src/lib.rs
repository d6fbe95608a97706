/// A long-running connection to one chat platform.
#[async_trait::async_trait]
pub trait ChatBot: Send {
    fn platform(&self) -> &str;
    async fn run(self: Box<Self>) -> anyhow::Result<()>;
}

#[cfg(feature = "discord")]
pub mod discord;
