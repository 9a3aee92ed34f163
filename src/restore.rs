// Bulk restore reducers for disaster recovery
// Accept JSON arrays exported from admin panel (TypeScript SDK format)

use spacetimedb::{reducer, ReducerContext, Timestamp, log};
use serde_json::Value;

use crate::progress::Progress;
use crate::store::{ProgressStore, TableStore};
use crate::user::UserProfile;

/// Parse Timestamp from SDK JSON format: {"__timestamp_micros_since_unix_epoch__": "123456"}
fn parse_timestamp_json(val: &Value) -> Result<Timestamp, String> {
    if let Some(micros) = val.as_i64() {
        return Ok(Timestamp::from_micros_since_unix_epoch(micros));
    }

    let micros_str = val.get("__timestamp_micros_since_unix_epoch__")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid timestamp field")?;

    let micros: i64 = micros_str.parse()
        .map_err(|e| format!("Invalid timestamp micros: {}", e))?;

    Ok(Timestamp::from_micros_since_unix_epoch(micros))
}

/// Parse one exported user_account row
fn parse_user(i: usize, u: &Value) -> Result<UserProfile, String> {
    let field = |name: &str| -> Result<String, String> {
        u.get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(format!("User {}: missing {}", i, name))
    };

    Ok(UserProfile {
        id: field("id")?,
        username: field("username")?.to_lowercase(),
        name: field("name")?,
        department: field("department")?,
        role: field("role")?,
        experience: field("experience")?,
        avatar: u.get("avatar").and_then(|v| v.as_str()).map(|s| s.to_string()),
        registered_at: parse_timestamp_json(u.get("registeredAt").ok_or(format!("User {}: missing registeredAt", i))?)?
            .to_micros_since_unix_epoch(),
    })
}

/// Parse one exported user_progress row
/// Only userId is mandatory: an unreadable document restores as bootstrap progress
fn parse_progress(i: usize, p: &Value) -> Result<Progress, String> {
    let user_id = p.get("userId")
        .and_then(|v| v.as_str())
        .ok_or(format!("Progress {}: missing userId", i))?;

    let mut doc = p.clone();
    if let Some(obj) = doc.as_object_mut() {
        // Table export stores best scores as a JSON string column
        let scores = match obj.remove("bestScores") {
            Some(Value::String(raw)) => serde_json::from_str::<Value>(&raw).ok(),
            Some(v @ Value::Object(_)) => Some(v),
            _ => None,
        };
        if let Some(scores) = scores {
            obj.insert("bestScores".to_string(), scores);
        }

        let completed_at = obj.remove("completedAt")
            .and_then(|v| parse_timestamp_json(&v).ok());
        if let Some(at) = completed_at {
            obj.insert("completedAt".to_string(), Value::from(at.to_micros_since_unix_epoch()));
        }
    }

    Ok(Progress::from_value_or_default(user_id, doc))
}

/// Bulk restore user_account table from JSON array
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn bulk_restore_users(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    crate::require_worker(ctx, "bulk_restore_users")?;

    let data: Value = serde_json::from_str(&json_data)
        .map_err(|e| format!("Invalid JSON: {}", e))?;

    let users = data.as_array()
        .ok_or("Expected JSON array of users")?;

    // Validate everything before writing anything
    let profiles = users.iter()
        .enumerate()
        .map(|(i, u)| parse_user(i, u))
        .collect::<Result<Vec<_>, _>>()?;

    let mut store = TableStore::new(ctx);
    for profile in &profiles {
        if let Some(owner) = store.user_by_username(&profile.username).map_err(|e| e.to_string())? {
            if owner.id != profile.id {
                return Err(format!("User {}: username {} already taken", profile.id, profile.username));
            }
        }
        store.save_user(profile).map_err(|e| e.to_string())?;
    }

    crate::write_leaderboard(ctx)?;
    log::info!("✅ Restored {} user records", profiles.len());
    Ok(())
}

/// Bulk restore user_progress table from JSON array
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn bulk_restore_progress(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    crate::require_worker(ctx, "bulk_restore_progress")?;

    let data: Value = serde_json::from_str(&json_data)
        .map_err(|e| format!("Invalid JSON: {}", e))?;

    let rows = data.as_array()
        .ok_or("Expected JSON array of progress records")?;

    let restored = rows.iter()
        .enumerate()
        .map(|(i, p)| parse_progress(i, p))
        .collect::<Result<Vec<_>, _>>()?;

    let mut store = TableStore::new(ctx);
    for progress in &restored {
        store.save_progress(progress).map_err(|e| e.to_string())?;
    }

    crate::write_leaderboard(ctx)?;
    log::info!("✅ Restored {} user_progress records", restored.len());
    Ok(())
}
