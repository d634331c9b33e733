//! The boundary between the Node Supervisor and the external command
//! collaborator (the interactive CLI), which is explicitly out of scope
//! is an explicit non-goal. This module specifies only the interface: the event stream
//! pushed out, and the request shapes a collaborator would issue.

use chrono::{DateTime, Utc};

/// Events the supervisor pushes to whatever is driving it (a TUI, a bot,
/// a test harness).
#[derive(Debug, Clone)]
pub enum NodeEvent {
    PeerOnline { username: String },
    PeerOffline { username: String },
    MessageReceived {
        from: String,
        content: String,
        at: DateTime<Utc>,
    },
    MessageDelivered { message_id: String },
}
