//! Shared test utilities for integration tests
//!
//! A canned chat backend that records what it was asked, and a project
//! fixture with a config pointing at it.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use assert_fs::prelude::*;
use forgeup::backend::{
    Backend, BackendError, BackendRegistry, ChatExchange, ChatRequest, RoleConfig, TokenUsage,
    construct_messages,
};

/// Requests seen by a canned backend, shared with the test.
pub type Seen = Rc<RefCell<Vec<ChatRequest>>>;

/// Backend that answers every chat with the same reply.
pub struct CannedBackend {
    model: String,
    reply: String,
    seen: Seen,
}

impl Backend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete_chat(
        &self,
        role: &RoleConfig,
        user_message: &str,
    ) -> Result<ChatExchange, BackendError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: construct_messages(role, user_message, true),
        };
        self.seen.borrow_mut().push(request.clone());
        let usage = TokenUsage {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: Some(15),
        };
        Ok(ChatExchange::new(request, self.reply.clone(), usage))
    }
}

/// Registry with a single `canned` backend replying `reply`.
pub fn canned_registry(reply: &str) -> (BackendRegistry, Seen) {
    let seen: Seen = Rc::default();
    let mut registry = BackendRegistry::empty();

    let reply = reply.to_string();
    let shared = Rc::clone(&seen);
    registry.register("canned", move |settings| {
        Ok(Box::new(CannedBackend {
            model: settings.model.clone(),
            reply: reply.clone(),
            seen: Rc::clone(&shared),
        }) as Box<dyn Backend>)
    });
    (registry, seen)
}

/// Registry whose `canned` backend always fails with an HTTP status error.
pub fn failing_registry() -> BackendRegistry {
    struct Failing;
    impl Backend for Failing {
        fn name(&self) -> &str {
            "canned"
        }
        fn model(&self) -> &str {
            "none"
        }
        fn complete_chat(&self, _: &RoleConfig, _: &str) -> Result<ChatExchange, BackendError> {
            Err(BackendError::Status {
                backend: "canned".into(),
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    let mut registry = BackendRegistry::empty();
    registry.register("canned", |_| Ok(Box::new(Failing) as Box<dyn Backend>));
    registry
}

/// Temp project with a `forgeup.yaml` selecting the canned backend.
pub fn canned_project() -> assert_fs::TempDir {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child("forgeup.yaml")
        .write_str("backend: canned\nmodel: canned-1\n")
        .expect("write config");
    tmp
}

/// A reply rewriting one file, wrapped in prose like a real model answer.
pub fn reply_for(path: &str, body: &str) -> String {
    format!("Sure, here is the update.\n\n<`{path}`>\n```\n{body}\nEOF\n```\n\nLet me know if you need more.\n")
}
