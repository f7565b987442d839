//! Resolution of transient speaker IDs to persistent identities.
//!
//! The resolver keeps a small TTL'd cache for rapid lookups and persists
//! stable identities with their known temporary aliases on disk. A
//! confidence threshold ensures that low-certainty matches are treated as
//! guests unless a recent high-confidence alias binding exists, which
//! mitigates accidental impersonation.
//!
//! The on-disk format (`{"identities": {uuid: {aliases, created_at, role}}}`,
//! sorted keys, two-space indent) is stable across upgrades and is always
//! written atomically via a temp file and rename.

use crate::clock::epoch_secs;
use crate::config::IdentityConfig;
use crate::error::Result;
use crate::trust::Role;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Seam the orchestrator uses so tests can supply deterministic mappings.
pub trait IdentityLookup: Send + Sync {
    /// Resolve a transient ID to `(stable_uuid, role_hint)`.
    fn resolve(&self, speaker_temp_id: &str, voice_prob: f64) -> (Option<String>, Option<Role>);
}

#[derive(Debug, Clone)]
struct CachedIdentity {
    stable_uuid: String,
    role: Role,
    expires_at: f64,
}

#[derive(Debug, Clone)]
struct IdentityRecord {
    role: Role,
    /// Alias -> last seen (epoch seconds). BTreeMap keeps persisted output
    /// deterministically ordered.
    aliases: BTreeMap<String, f64>,
    created_at: f64,
}

#[derive(Default)]
struct ResolverState {
    cache: HashMap<String, CachedIdentity>,
    identities: BTreeMap<String, IdentityRecord>,
    alias_index: HashMap<String, (String, f64)>,
}

/// Resolve transient speaker IDs to persistent identities.
pub struct IdentityResolver {
    config: IdentityConfig,
    state: Mutex<ResolverState>,
}

impl IdentityResolver {
    /// Create a resolver, loading any existing identity map from disk.
    ///
    /// A malformed persistence file is copied to `<path>.bak` and the
    /// resolver starts from an empty state.
    pub fn new(config: IdentityConfig) -> Result<Self> {
        config.validate()?;
        let resolver = Self {
            config,
            state: Mutex::new(ResolverState::default()),
        };
        resolver.load()?;
        Ok(resolver)
    }

    /// Resolve a transient ID to a stable identity and inferred role.
    ///
    /// `voice_prob` is the speaker-verification confidence (0-1). Low
    /// confidence suppresses the lookup unless a recent alias binding
    /// exists; between the degrade and minimum thresholds the UUID is still
    /// returned for auditing, but the role degrades to guest.
    #[must_use]
    pub fn resolve(&self, speaker_temp_id: &str, voice_prob: f64) -> (Option<String>, Role) {
        self.resolve_at(speaker_temp_id, voice_prob, epoch_secs())
    }

    fn resolve_at(&self, speaker_temp_id: &str, voice_prob: f64, now: f64) -> (Option<String>, Role) {
        let mut state = self.lock_state();

        if let Some(cached) = state.cache.get(speaker_temp_id)
            && cached.expires_at > now
        {
            return (Some(cached.stable_uuid.clone()), cached.role);
        }

        if let Some((stable_uuid, stored_role)) = self.lookup_alias(&mut state, speaker_temp_id, now)
            && voice_prob >= self.config.degrade_confidence
        {
            let role = if voice_prob < self.config.min_voice_confidence {
                // Degrade to guest while still returning the UUID for audit.
                Role::Guest
            } else {
                stored_role
            };
            self.remember(&mut state, speaker_temp_id, &stable_uuid, role, now);
            return (Some(stable_uuid), role);
        }

        // High confidence but unseen alias: guest until registered.
        (None, Role::Guest)
    }

    /// Associate a transient speaker with a stable identity and role.
    pub fn register_identity(
        &self,
        speaker_temp_id: &str,
        stable_uuid: &str,
        role: Role,
    ) -> Result<()> {
        let now = epoch_secs();
        let mut state = self.lock_state();
        let record = state
            .identities
            .entry(stable_uuid.to_owned())
            .or_insert_with(|| IdentityRecord {
                role,
                aliases: BTreeMap::new(),
                created_at: now,
            });
        record.role = role;
        record.aliases.insert(speaker_temp_id.to_owned(), now);
        state
            .alias_index
            .insert(speaker_temp_id.to_owned(), (stable_uuid.to_owned(), now));
        self.remember(&mut state, speaker_temp_id, stable_uuid, role, now);
        self.save(&state)
    }

    /// Enrol a brand-new identity for a transient speaker, minting its
    /// stable UUID. Returns the UUID.
    pub fn mint_identity(&self, speaker_temp_id: &str, role: Role) -> Result<String> {
        let stable_uuid = uuid::Uuid::new_v4().to_string();
        self.register_identity(speaker_temp_id, &stable_uuid, role)?;
        Ok(stable_uuid)
    }

    /// Forget a stable identity. Returns the number of aliases removed.
    pub fn forget_identity(&self, stable_uuid: &str) -> Result<usize> {
        let mut state = self.lock_state();
        let Some(record) = state.identities.remove(stable_uuid) else {
            return Ok(0);
        };
        for alias in record.aliases.keys() {
            state.cache.remove(alias);
            state.alias_index.remove(alias);
        }
        self.save(&state)?;
        Ok(record.aliases.len())
    }

    /// Number of identities currently known.
    #[must_use]
    pub fn identity_count(&self) -> usize {
        self.lock_state().identities.len()
    }

    fn lookup_alias(
        &self,
        state: &mut ResolverState,
        speaker_temp_id: &str,
        now: f64,
    ) -> Option<(String, Role)> {
        let (stable_uuid, last_seen) = state.alias_index.get(speaker_temp_id)?.clone();
        if now - last_seen > self.config.alias_ttl_secs {
            // Expired alias: drop it entirely and re-persist.
            state.alias_index.remove(speaker_temp_id);
            if let Some(record) = state.identities.get_mut(&stable_uuid) {
                record.aliases.remove(speaker_temp_id);
            }
            if let Err(err) = self.save(state) {
                warn!("failed to persist alias expiry: {err}");
            }
            debug!("pruned expired alias {speaker_temp_id}");
            return None;
        }
        let record = state.identities.get(&stable_uuid)?;
        Some((stable_uuid, record.role))
    }

    fn remember(
        &self,
        state: &mut ResolverState,
        speaker_temp_id: &str,
        stable_uuid: &str,
        role: Role,
        now: f64,
    ) {
        state.cache.insert(
            speaker_temp_id.to_owned(),
            CachedIdentity {
                stable_uuid: stable_uuid.to_owned(),
                role,
                expires_at: now + self.config.cache_ttl_secs,
            },
        );
        if let Some(record) = state.identities.get_mut(stable_uuid) {
            record.aliases.insert(speaker_temp_id.to_owned(), now);
            state
                .alias_index
                .insert(speaker_temp_id.to_owned(), (stable_uuid.to_owned(), now));
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ResolverState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // ── persistence ─────────────────────────────────────────────────────

    fn load(&self) -> Result<()> {
        let path = &self.config.map_path;
        if !path.exists() {
            return Ok(());
        }

        let raw = std::fs::read_to_string(path)?;
        let data: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                // Corrupt file: keep a backup and reset state.
                warn!("identity map is corrupt ({err}); backing up and resetting");
                let backup = backup_path(path);
                std::fs::write(&backup, raw.as_bytes())?;
                return Ok(());
            }
        };

        let now = epoch_secs();
        let mut state = self.lock_state();
        state.identities.clear();
        state.alias_index.clear();

        let identities = data
            .get("identities")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (stable_uuid, payload) in identities {
            let Some(payload) = payload.as_object() else {
                continue;
            };
            let role = payload
                .get("role")
                .and_then(Value::as_str)
                .map(Role::parse)
                .unwrap_or(Role::Guest);
            let mut alias_map = BTreeMap::new();
            if let Some(aliases) = payload.get("aliases").and_then(Value::as_object) {
                for (alias, ts) in aliases {
                    let Some(last_seen) = ts.as_f64() else {
                        continue;
                    };
                    if now - last_seen <= self.config.alias_ttl_secs {
                        alias_map.insert(alias.clone(), last_seen);
                        state
                            .alias_index
                            .insert(alias.clone(), (stable_uuid.clone(), last_seen));
                    }
                }
            }
            let created_at = payload
                .get("created_at")
                .and_then(Value::as_f64)
                .unwrap_or(now);
            state.identities.insert(
                stable_uuid,
                IdentityRecord {
                    role,
                    aliases: alias_map,
                    created_at,
                },
            );
        }
        Ok(())
    }

    fn save(&self, state: &ResolverState) -> Result<()> {
        let mut identities = Map::new();
        for (stable_uuid, record) in &state.identities {
            let aliases: Map<String, Value> = record
                .aliases
                .iter()
                .map(|(alias, ts)| (alias.clone(), json!(ts)))
                .collect();
            identities.insert(
                stable_uuid.clone(),
                json!({
                    "aliases": aliases,
                    "created_at": record.created_at,
                    "role": record.role.as_str(),
                }),
            );
        }
        let payload = json!({ "identities": identities });
        let serialized = serde_json::to_string_pretty(&payload)?;

        let path = &self.config.map_path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized.as_bytes())?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl IdentityLookup for IdentityResolver {
    fn resolve(&self, speaker_temp_id: &str, voice_prob: f64) -> (Option<String>, Option<Role>) {
        let (uuid, role) = IdentityResolver::resolve(self, speaker_temp_id, voice_prob);
        (uuid, Some(role))
    }
}

fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(".bak");
    std::path::PathBuf::from(os_string)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::path::PathBuf;

    fn resolver_at(dir: &Path) -> IdentityResolver {
        IdentityResolver::new(config_at(dir)).unwrap()
    }

    fn config_at(dir: &Path) -> IdentityConfig {
        IdentityConfig {
            map_path: dir.join("identity_map.json"),
            ..IdentityConfig::default()
        }
    }

    #[test]
    fn unseen_speaker_is_guest() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        let (uuid, role) = resolver.resolve("speaker-a", 0.9);
        assert_eq!(uuid, None);
        assert_eq!(role, Role::Guest);
    }

    #[test]
    fn registered_identity_resolves_with_role() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        resolver
            .register_identity("speaker-a", "uuid-1", Role::Owner)
            .unwrap();

        let (uuid, role) = resolver.resolve("speaker-a", 0.9);
        assert_eq!(uuid.as_deref(), Some("uuid-1"));
        assert_eq!(role, Role::Owner);
    }

    #[test]
    fn mid_confidence_degrades_role_but_keeps_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        resolver
            .register_identity("speaker-a", "uuid-1", Role::Owner)
            .unwrap();
        // Clear the resolve cache so the threshold path is exercised.
        resolver.lock_state().cache.clear();

        let (uuid, role) = resolver.resolve("speaker-a", 0.45);
        assert_eq!(uuid.as_deref(), Some("uuid-1"));
        assert_eq!(role, Role::Guest);
    }

    #[test]
    fn very_low_confidence_suppresses_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        resolver
            .register_identity("speaker-a", "uuid-1", Role::Owner)
            .unwrap();
        resolver.lock_state().cache.clear();

        let (uuid, role) = resolver.resolve("speaker-a", 0.1);
        assert_eq!(uuid, None);
        assert_eq!(role, Role::Guest);
    }

    #[test]
    fn cache_hit_bypasses_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        resolver
            .register_identity("speaker-a", "uuid-1", Role::Owner)
            .unwrap();

        // register_identity primed the cache, so even a silent frame maps.
        let (uuid, role) = resolver.resolve("speaker-a", 0.0);
        assert_eq!(uuid.as_deref(), Some("uuid-1"));
        assert_eq!(role, Role::Owner);
    }

    #[test]
    fn expired_alias_never_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let config = IdentityConfig {
            map_path: dir.path().join("identity_map.json"),
            alias_ttl_secs: 60.0,
            ..IdentityConfig::default()
        };
        let resolver = IdentityResolver::new(config).unwrap();
        resolver
            .register_identity("speaker-a", "uuid-1", Role::Owner)
            .unwrap();
        resolver.lock_state().cache.clear();

        // Two minutes later the alias is past its TTL.
        let future = epoch_secs() + 120.0;
        let (uuid, role) = resolver.resolve_at("speaker-a", 0.9, future);
        assert_eq!(uuid, None);
        assert_eq!(role, Role::Guest);

        // The prune is persisted: a fresh resolver no longer sees the alias.
        let reloaded = resolver_at(dir.path());
        let (uuid, _) = reloaded.resolve("speaker-a", 0.9);
        assert_eq!(uuid, None);
    }

    #[test]
    fn forget_identity_removes_all_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        resolver
            .register_identity("speaker-a", "uuid-1", Role::Owner)
            .unwrap();
        resolver
            .register_identity("speaker-b", "uuid-1", Role::Owner)
            .unwrap();

        assert_eq!(resolver.forget_identity("uuid-1").unwrap(), 2);
        assert_eq!(resolver.forget_identity("uuid-1").unwrap(), 0);
        let (uuid, _) = resolver.resolve("speaker-a", 0.9);
        assert_eq!(uuid, None);
        assert_eq!(resolver.identity_count(), 0);
    }

    #[test]
    fn mint_identity_enrols_and_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        let uuid = resolver.mint_identity("speaker-new", Role::Household).unwrap();

        let (resolved, role) = resolver.resolve("speaker-new", 0.9);
        assert_eq!(resolved.as_deref(), Some(uuid.as_str()));
        assert_eq!(role, Role::Household);
        // Minted UUIDs are unique per enrolment.
        let other = resolver.mint_identity("speaker-other", Role::Guest).unwrap();
        assert_ne!(uuid, other);
    }

    #[test]
    fn persistence_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        {
            let resolver = resolver_at(dir.path());
            resolver
                .register_identity("speaker-a", "uuid-1", Role::Household)
                .unwrap();
        }
        let reloaded = resolver_at(dir.path());
        let (uuid, role) = reloaded.resolve("speaker-a", 0.9);
        assert_eq!(uuid.as_deref(), Some("uuid-1"));
        assert_eq!(role, Role::Household);
    }

    #[test]
    fn persisted_format_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_at(dir.path());
        resolver
            .register_identity("speaker-a", "uuid-1", Role::Owner)
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("identity_map.json")).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        let record = &value["identities"]["uuid-1"];
        assert_eq!(record["role"], json!("owner"));
        assert!(record["aliases"]["speaker-a"].is_f64());
        assert!(record["created_at"].is_f64());
        // Pretty-printed with sorted keys.
        assert!(raw.contains("\n  \"identities\""));
        let aliases_pos = raw.find("\"aliases\"").unwrap();
        let role_pos = raw.find("\"role\"").unwrap();
        assert!(aliases_pos < role_pos);
    }

    #[test]
    fn corrupt_map_is_backed_up_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let map_path = dir.path().join("identity_map.json");
        std::fs::write(&map_path, b"{not json at all").unwrap();

        let resolver = resolver_at(dir.path());
        assert_eq!(resolver.identity_count(), 0);

        let backup: PathBuf = dir.path().join("identity_map.json.bak");
        assert!(backup.exists());
        assert_eq!(std::fs::read(&backup).unwrap(), b"{not json at all");
    }

    #[test]
    fn unknown_role_labels_load_as_guest() {
        let dir = tempfile::tempdir().unwrap();
        let map_path = dir.path().join("identity_map.json");
        std::fs::write(
            &map_path,
            serde_json::to_string(&json!({
                "identities": {
                    "uuid-1": {
                        "role": "emperor",
                        "aliases": {"speaker-a": epoch_secs()},
                        "created_at": epoch_secs(),
                    }
                }
            }))
            .unwrap(),
        )
        .unwrap();

        let resolver = resolver_at(dir.path());
        let (uuid, role) = resolver.resolve("speaker-a", 0.9);
        assert_eq!(uuid.as_deref(), Some("uuid-1"));
        assert_eq!(role, Role::Guest);
    }
}
