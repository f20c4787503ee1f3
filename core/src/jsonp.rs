//! Script-injection transport.
//!
//! A JSONP call registers a handler under a fresh name in the
//! `CallbackRegistry`, injects a script whose URL carries that name in the
//! `callback` parameter, and waits for the loaded script to invoke it.
//! Cleanup detaches the script, neutralizes the name and clears the timer;
//! it is safe to run any number of times.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::completion::{CancelHandle, Completion};
use crate::error::RequestError;
use crate::host::{Environment, ScriptId, TimerId};
use crate::options::RequestOptions;
use crate::params::paramify;

/// Parameter that tells the server which function to wrap the payload in.
pub const CALLBACK_PARAM: &str = "callback";

#[derive(Default)]
struct Pending {
    script: Option<ScriptId>,
    timer: Option<TimerId>,
}

/// The URL of the script that will invoke `callback_name`.
pub fn script_src(options: &RequestOptions, callback_name: &str) -> Result<String, RequestError> {
    let url = options.url.as_deref().ok_or(RequestError::MissingUrl)?;
    let mut params = options.params.clone();
    params.insert(CALLBACK_PARAM, callback_name);
    Ok(format!("{url}{}", paramify(&params, true)))
}

/// Start a JSONP request. The method in `options` is ignored.
pub fn send(
    env: &Environment,
    options: &RequestOptions,
    completion: Completion,
) -> Result<CancelHandle, RequestError> {
    let registry = Rc::clone(env.registry());
    let name = registry.next_name();
    let src = script_src(options, &name)?;

    let pending = Rc::new(RefCell::new(Pending::default()));

    let cleanup: Rc<dyn Fn()> = {
        let pending = Rc::clone(&pending);
        let registry = Rc::clone(&registry);
        let document = Rc::clone(env.document());
        let timers = Rc::clone(env.timers());
        let name = name.clone();
        Rc::new(move || {
            let (script, timer) = {
                let mut state = pending.borrow_mut();
                (state.script.take(), state.timer.take())
            };
            if let Some(id) = script {
                document.remove(id);
            }
            registry.neutralize(&name);
            if let Some(id) = timer {
                timers.clear_timeout(id);
            }
        })
    };

    {
        let cleanup = Rc::clone(&cleanup);
        let completion = completion.clone();
        let callback_name = name.clone();
        registry.register(
            &name,
            Box::new(move |payload| {
                debug!(callback = %callback_name, "jsonp payload received");
                cleanup();
                completion.settle(Ok(payload));
            }),
        );
    }

    if options.timeout_ms > 0 {
        let ms = options.timeout_ms;
        let cleanup = Rc::clone(&cleanup);
        let completion = completion.clone();
        let callback_name = name.clone();
        let id = env.timers().set_timeout(
            Duration::from_millis(ms),
            Box::new(move || {
                debug!(callback = %callback_name, ms, "jsonp request timed out");
                cleanup();
                completion.settle(Err(RequestError::Timeout { ms }));
            }),
        );
        pending.borrow_mut().timer = Some(id);
    }

    debug!(callback = %name, src = %src, "injecting jsonp script");
    let script = env.document().inject(&src);
    if registry.is_active(&name) {
        pending.borrow_mut().script = Some(script);
    } else {
        // The script ran while it was being inserted.
        env.document().remove(script);
    }

    Ok(CancelHandle::new(move || {
        if registry.is_active(&name) {
            debug!(callback = %name, "jsonp request cancelled");
            cleanup();
            completion.discard();
        }
    }))
}

/// Split a `name(payload);` script body into the function name and the raw
/// payload text. Returns `None` for anything that is not a single call.
///
/// The wrapper some servers emit, `/**/ typeof name === 'function' &&
/// name(payload);`, is accepted when the guard names the called function.
pub fn split_invocation(script: &str) -> Option<(&str, &str)> {
    let script = script.trim();
    let script = script.strip_prefix("/**/").unwrap_or(script).trim_start();
    let script = script.trim_end_matches(';').trim_end();

    let (guard, call) = match script.strip_prefix("typeof ") {
        Some(rest) => {
            let (guard, call) = rest.split_once("&&")?;
            (Some(guard), call.trim_start())
        }
        None => (None, script),
    };

    let open = call.find('(')?;
    let inner = call.strip_suffix(')')?;

    let name = call[..open].trim();
    let is_identifier = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'));
    if !is_identifier {
        return None;
    }
    if let Some(guard) = guard {
        let (guarded, kind) = guard.split_once("===")?;
        let kind = kind.trim();
        if guarded.trim() != name || !matches!(kind, "'function'" | "\"function\"") {
            return None;
        }
    }

    Some((name, inner[open + 1..].trim()))
}
