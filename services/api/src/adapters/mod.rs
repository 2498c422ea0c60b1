pub mod completion_llm;
pub mod db;
pub mod extract;
pub mod storage;
pub mod telegram;

pub use completion_llm::OpenAiCompletionAdapter;
pub use db::DbAdapter;
pub use extract::CompositeExtractor;
pub use storage::LocalDocumentStorage;
pub use telegram::{LogSender, TelegramSender};
