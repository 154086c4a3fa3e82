//! Skiff — run commands on EC2 instances over SSH, with detachable screen
//! sessions.
//!
//! A [`session::Session`] binds to one instance (looked up through an
//! [`instance::InstanceDirectory`]) and executes commands over ssh. Plain runs
//! capture stdout and stderr distinctly; screen-backed runs multiplex through
//! a remote `screen` session, which survives disconnection and can be left
//! running with `detach`.
//!
//! # Quick start
//!
//! ```no_run
//! use skiff::instance::Ec2CliDirectory;
//! use skiff::session::{ExecutionRequest, Session, SessionOptions};
//!
//! # async fn example() {
//! let session = Session::open(
//!     &Ec2CliDirectory,
//!     "i-0abc123",
//!     "us-east-1",
//!     SessionOptions::default(),
//! )
//! .await
//! .unwrap();
//! let output = session.run(&ExecutionRequest::new("uname -a")).await.unwrap();
//! println!("{}", output.stdout);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod marker;
mod screen;
pub mod session;
pub mod transport;
