//! Built-in dispatch rules for game server console output.
//!
//! Order matters, the first match wins:
//!
//! 1. `Done (12.3s)! For help` → `serverReady`
//! 2. `<name> joined the game` → presence join + `userJoin`
//! 3. `<name> left the game` → presence leave + `userLeave`
//! 4. `<<name>> <message>` → `chat` + ephemeral `userActivity`
//!
//! A line is matched either from its start or after the `]: ` that ends the
//! server's log prefix (`[12:00:00] [Server thread/INFO]: `). Chat lines
//! start with `<`, which user names cannot contain, so chatting
//! `x joined the game` cannot fake a join.

use serde_json::{Value, json};

use mcwarden_core::{EventKind, LineDispatcher, Result};

use crate::bus::EventBus;

const PREFIX: &str = r"(?:^|\]: )";
const NAME: &str = r"(?P<name>[A-Za-z0-9_]{1,16})";

/// Build the dispatcher with the built-in rule set publishing to `bus`.
pub fn default_dispatcher(bus: &EventBus) -> Result<LineDispatcher> {
    let ready_bus = bus.clone();
    let join_bus = bus.clone();
    let leave_bus = bus.clone();
    let chat_bus = bus.clone();

    let dispatcher = LineDispatcher::builder()
        .rule(
            "server-ready",
            &format!(r"{PREFIX}Done \((?P<secs>[0-9.]+)s\)! For help"),
            move |caps| {
                let startup = caps["secs"].parse::<f64>().map_or(Value::Null, |s| json!(s));
                ready_bus.publish(EventKind::ServerReady, json!({ "startup": startup }));
            },
        )?
        .rule(
            "user-join",
            &format!(r"{PREFIX}{NAME} joined the game\s*$"),
            move |caps| {
                join_bus.user_joined(&caps["name"]);
            },
        )?
        .rule(
            "user-leave",
            &format!(r"{PREFIX}{NAME} left the game\s*$"),
            move |caps| {
                leave_bus.user_left(&caps["name"]);
            },
        )?
        .rule(
            "chat",
            &format!(r"{PREFIX}<{NAME}> (?P<message>.*)$"),
            move |caps| {
                let name = &caps["name"];
                chat_bus.publish(
                    EventKind::Chat,
                    json!({ "name": name, "message": &caps["message"] }),
                );
                chat_bus.user_active(name);
            },
        )?
        .build();
    Ok(dispatcher)
}
