use std::collections::HashMap;

use crate::{Assignment, DrawError, Participant};

const HEADER: &str = "name,assigned_to_name";

/// Formats a finished draw as CSV, one row per participant in the given order.
pub fn export_csv(participants: &[Participant]) -> Result<String, DrawError> {
    let assignment = Assignment::from_sealed(participants)?;
    let names: HashMap<&str, &str> = participants
        .iter()
        .map(|p| (p.id.as_str(), p.name.as_str()))
        .collect();

    let mut out = String::from(HEADER);
    out.push_str("\r\n");
    for p in participants {
        let recipient_name = assignment
            .recipient_of(&p.id)
            .and_then(|id| names.get(id.as_str()))
            .ok_or_else(|| {
                DrawError::InvalidAssignment(format!("no recipient name for {}", p.id))
            })?;
        out.push_str(&escape_field(&p.name));
        out.push(',');
        out.push_str(&escape_field(recipient_name));
        out.push_str("\r\n");
    }
    Ok(out)
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
