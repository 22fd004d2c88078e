pub mod assembler;
pub mod chat_api;
mod client_utils;
pub mod command;
mod context;
mod conversation;
pub mod docchat_test;
mod errors;
mod options;
mod retrieval;
pub mod search_api;
mod session;
mod stream;
mod types;
mod types_ext;

pub use assembler::{assemble, ResolvedDirective};
pub use command::{CommandGrammar, CommandParser, Directive, DirectiveSpec, PendingCommand};
pub use context::ContextStore;
pub use conversation::{Conversation, ConversationState, Termination};
pub use errors::*;
pub use options::*;
pub use retrieval::{into_artifacts, DocumentRetriever, HttpRetriever};
pub use session::{ChatEvent, ChatSession, SendOutcome};
pub use stream::{
    decode_token_stream, parse_frame, ChatTransport, Frame, HttpChatTransport, TokenStream,
    DONE_SENTINEL,
};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
