//! Rook core library: chess assistant agents, knowledge base, Chess.com tools and the
//! HTTP gateway used by the CLI.

pub mod agent;
pub mod chess;
pub mod config;
pub mod gateway;
pub mod init;
pub mod knowledge;
pub mod llm;
pub mod prompts;
pub mod routing;
pub mod session;
pub mod tools;
pub mod vector;
