//! Variable templating for unit content.
//!
//! A unit that declares `variables: "host, port"` requires both names to be
//! bound before anything in the run takes effect; the first missing name
//! fails the whole run. Bound names are substituted into `{{name}}` tokens
//! in the unit's content. Tokens naming variables outside the bindings are
//! left exactly as written.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::unit::Unit;

/// Variable bindings supplied by the caller for one run.
pub type Bindings = BTreeMap<String, String>;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("token pattern is valid")
});

/// Validate a unit's declared variables and render its content.
///
/// Returns the content unchanged when the unit declares no variables.
pub fn render(unit: &Unit, bindings: &Bindings) -> Result<String> {
    let Some(declared) = unit.variables.as_deref() else {
        return Ok(unit.content.clone());
    };

    for name in declared.split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if !bindings.contains_key(name) {
            return Err(Error::MissingVariable { name: name.into() });
        }
    }

    Ok(substitute(&unit.content, bindings))
}

/// Replace every `{{name}}` token with its binding; unbound tokens stay
/// literal.
fn substitute(content: &str, bindings: &Bindings) -> String {
    TOKEN
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
