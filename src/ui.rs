//! Interactive prompts

use crate::error::OtoolsError;
use anyhow::Result;
use dialoguer::{Confirm, Input, Select};

/// Ask a yes/no question, defaulting to no
pub fn ask_confirmation(message: &str) -> Result<bool> {
    Ok(Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()?)
}

/// Abort unless the user agrees
pub fn ask_or_abort(message: &str) -> Result<()> {
    if ask_confirmation(message)? {
        Ok(())
    } else {
        Err(OtoolsError::Aborted("Aborted".into()).into())
    }
}

pub fn ask_question(message: &str, default: Option<String>) -> Result<String> {
    let mut input = Input::<String>::new().with_prompt(message);
    if let Some(default) = default {
        input = input.default(default);
    }
    Ok(input.interact_text()?)
}

/// Pick one of `items`; returns its index
pub fn select(message: &str, items: &[String]) -> Result<usize> {
    Ok(Select::new()
        .with_prompt(message)
        .items(items)
        .default(0)
        .interact()?)
}
