//! Configuration validation engine.
//!
//! Validates config files against the known schema, detects
//! unknown/misspelled fields, and reports semantic problems in sink
//! definitions.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use secrecy::ExposeSecret;

use crate::{
    env_subst::{has_placeholder, substitute_env},
    schema::{ReconnectPolicy, RoomsyncConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "sink", "relay",
    /// "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "sinks[0].synced_rooms[1]"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}]: {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Array(Box<KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, Struct};

    let reconnect = Struct(HashMap::from([
        ("mode", Leaf),
        ("initial_delay_ms", Leaf),
        ("max_delay_ms", Leaf),
        ("max_attempts", Leaf),
    ]));

    let relay = Struct(HashMap::from([
        ("poll_interval_ms", Leaf),
        ("keepalive_interval_secs", Leaf),
        ("api_base_url", Leaf),
        ("edit_marker", Leaf),
        ("reconnect", reconnect),
    ]));

    let sink = || {
        Struct(HashMap::from([
            ("name", Leaf),
            ("credential_key", Leaf),
            ("credentialKey", Leaf),
            ("key", Leaf),
            ("synced_rooms", Leaf),
            ("syncedRooms", Leaf),
            ("synced_conversations", Leaf),
        ]))
    };

    Struct(HashMap::from([
        ("relay", relay),
        ("sinks", Array(Box::new(sink()))),
        ("slackrtm", Array(Box::new(sink()))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; no sinks will be started".into(),
            }],
            config_path: None,
        };
    };

    let diagnostics = match std::fs::read_to_string(&actual_path) {
        Ok(content) => {
            let ext = actual_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("toml");
            validate_str(&content, ext).diagnostics
        },
        Err(e) => vec![Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: format!("failed to read config file: {e}"),
        }],
    };

    ValidationResult {
        diagnostics,
        config_path: Some(actual_path),
    }
}

/// Validate raw config text in the given format (`toml`, `yaml`, `yml`,
/// `json`) without touching the file system.
#[must_use]
pub fn validate_str(raw: &str, format: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let raw = substitute_env(raw);

    // 1. Syntax
    let value = match parse_value(&raw, format) {
        Ok(v) => v,
        Err(message) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message,
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields
    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    // 3. Types, then semantics on the parsed config
    match serde_json::from_value::<RoomsyncConfig>(value) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn parse_value(raw: &str, format: &str) -> Result<serde_json::Value, String> {
    match format {
        "toml" => toml::from_str::<toml::Value>(raw)
            .map_err(|e| format!("TOML syntax error: {e}"))
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str::<serde_json::Value>(raw)
            .map_err(|e| format!("YAML syntax error: {e}")),
        "json" => serde_json::from_str(raw).map_err(|e| format!("JSON syntax error: {e}")),
        other => Err(format!("unsupported config format: .{other}")),
    }
}

/// Walk the value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (serde_json::Value::Object(map), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child, child_schema, &path, diagnostics);
                    continue;
                }
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    category: "unknown-field",
                    path,
                    message,
                });
            }
        },
        (serde_json::Value::Array(items), KnownKeys::Array(item_schema)) => {
            for (i, item) in items.iter().enumerate() {
                check_unknown_fields(item, item_schema, &format!("{prefix}[{i}]"), diagnostics);
            }
        },
        // Leaf or type mismatch; type errors are reported later.
        _ => {},
    }
}

fn check_semantics(config: &RoomsyncConfig, diagnostics: &mut Vec<Diagnostic>) {
    let mut push = |severity, category, path: String, message: String| {
        diagnostics.push(Diagnostic {
            severity,
            category,
            path,
            message,
        });
    };

    let relay = &config.relay;
    if relay.poll_interval_ms == 0 {
        push(
            Severity::Error,
            "relay",
            "relay.poll_interval_ms".into(),
            "must be greater than zero".into(),
        );
    }
    if relay.keepalive_interval_secs == 0 {
        push(
            Severity::Error,
            "relay",
            "relay.keepalive_interval_secs".into(),
            "must be greater than zero".into(),
        );
    }
    if let ReconnectPolicy::Backoff {
        initial_delay_ms,
        max_delay_ms,
        ..
    } = relay.reconnect
        && initial_delay_ms > max_delay_ms
    {
        push(
            Severity::Error,
            "relay",
            "relay.reconnect".into(),
            format!("initial_delay_ms ({initial_delay_ms}) exceeds max_delay_ms ({max_delay_ms})"),
        );
    }

    if config.sinks.is_empty() {
        push(
            Severity::Warning,
            "sink",
            "sinks".into(),
            "no sinks configured; nothing will be relayed".into(),
        );
    }

    let mut sink_names = HashSet::new();
    for (i, sink) in config.sinks.iter().enumerate() {
        let base = format!("sinks[{i}]");
        if !sink_names.insert(sink.display_name(i)) {
            push(
                Severity::Error,
                "sink",
                format!("{base}.name"),
                format!("duplicate sink name \"{}\"", sink.display_name(i)),
            );
        }

        let credential = sink.credential_key.expose_secret();
        if credential.trim().is_empty() {
            push(
                Severity::Error,
                "sink",
                format!("{base}.credential_key"),
                "credential is empty".into(),
            );
        } else if has_placeholder(credential) {
            push(
                Severity::Warning,
                "sink",
                format!("{base}.credential_key"),
                "credential contains an unresolved ${...} placeholder".into(),
            );
        }

        if sink.synced_rooms.is_empty() {
            push(
                Severity::Warning,
                "sink",
                format!("{base}.synced_rooms"),
                "no synced rooms; this sink relays nothing".into(),
            );
        }

        let mut pairs = HashSet::new();
        let mut names: HashMap<&str, &str> = HashMap::new();
        for (j, room) in sink.synced_rooms.iter().enumerate() {
            let path = format!("{base}.synced_rooms[{j}]");
            if room.channel_id.trim().is_empty() || room.conversation_id.trim().is_empty() {
                push(
                    Severity::Error,
                    "sink",
                    path.clone(),
                    "channel and conversation ids must not be empty".into(),
                );
            }
            if !pairs.insert((room.channel_id.as_str(), room.conversation_id.as_str())) {
                push(
                    Severity::Warning,
                    "sink",
                    path.clone(),
                    format!(
                        "duplicate mapping {} <-> {}; messages will be delivered twice",
                        room.channel_id, room.conversation_id
                    ),
                );
            }
            if let Some(name) = room.display_name.as_deref()
                && let Some(previous) = names.insert(name, room.conversation_id.as_str())
                && previous != room.conversation_id
            {
                push(
                    Severity::Warning,
                    "sink",
                    path,
                    format!(
                        "display name \"{name}\" is shared by conversations {previous} and {}; \
                         relay loop suppression cannot tell them apart",
                        room.conversation_id
                    ),
                );
            }
        }
    }
}
