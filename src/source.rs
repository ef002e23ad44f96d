//! Database-backed message source.
//!
//! `MessageSource` maps culture-qualified catalogue names (`messages.ru`) to
//! the translation units stored for them, creates catalogues on first use,
//! and keeps the external cache consistent after every mutation.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cache::{self, CatalogCache};
use crate::config::Config;
use crate::db::{self, NewUnit, Pool};
use crate::error::{CatalogError, Result};
use crate::model::{
    CatalogueExport, CatalogueName, Message, RejectReason, SourceCheck, Variant, VariantPolicy,
};

/// Comment stored on units queued through `append` + `save`.
const SAVE_COMMENT: &str = "save";
/// User id recorded for mutations that carry none.
const SYSTEM_USER: i64 = 1;

pub struct MessageSource {
    pool: Pool,
    culture: String,
    policy: VariantPolicy,
    cache: Option<Arc<dyn CatalogCache>>,
    untranslated: Vec<String>,
}

/// Catalogue resolved for a mutation.
struct Resolved {
    id: i64,
    variant: String,
    culture: String,
}

impl MessageSource {
    pub fn new(
        pool: Pool,
        culture: impl Into<String>,
        policy: VariantPolicy,
        cache: Option<Arc<dyn CatalogCache>>,
    ) -> Self {
        Self {
            pool,
            culture: culture.into(),
            policy,
            cache,
            untranslated: Vec::new(),
        }
    }

    /// Open the configured database, apply migrations and wire the cache.
    /// Any failure here is final; nothing is retried.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let pool = db::init_pool(
            &cfg.database_url(),
            cfg.database.max_connections,
            Duration::from_millis(cfg.database.busy_timeout_ms),
        )
        .await?;
        db::run_migrations(&pool).await?;
        info!(culture = %cfg.i18n.culture, "message source connected");
        Ok(Self::new(
            pool,
            cfg.i18n.culture.clone(),
            cfg.variant_policy(),
            cache::from_config(&cfg.cache),
        ))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn culture(&self) -> &str {
        &self.culture
    }

    pub fn set_culture(&mut self, culture: impl Into<String>) {
        self.culture = culture.into();
    }

    /// All units of `variant` keyed by source text. Later rows shadow
    /// earlier ones with the same source. Bare names read the catalogue of
    /// the current culture.
    #[instrument(skip(self))]
    pub async fn load_data(&self, variant: &str) -> Result<BTreeMap<String, Message>> {
        let (name, _) = self.qualify(variant)?;
        let rows = db::load_units(&self.pool, &name).await?;
        let mut out = BTreeMap::new();
        for row in rows {
            out.insert(
                row.source,
                Message {
                    target: row.target,
                    id: row.id,
                    comments: row.comments,
                },
            );
        }
        debug!(count = out.len(), "catalogue loaded");
        Ok(out)
    }

    /// Decide whether `variant` can be used for lookups, creating its
    /// catalogue row when it is allowed but missing. Rejections never touch
    /// storage.
    #[instrument(skip(self))]
    pub async fn is_valid_source(&self, variant: &str) -> Result<SourceCheck> {
        let Some(parsed) = Variant::parse(variant) else {
            return Ok(SourceCheck::Rejected(RejectReason::Malformed));
        };
        let name = parsed.qualified(&self.culture);
        if self.policy.is_reserved(variant) || self.policy.is_reserved(&name) {
            return Ok(SourceCheck::Rejected(RejectReason::Reserved));
        }
        let culture = parsed.culture_or(&self.culture);
        for c in [culture, self.culture.as_str()] {
            if !self.policy.allows_culture(c) {
                return Ok(SourceCheck::Rejected(RejectReason::UnsupportedCulture(
                    c.to_string(),
                )));
            }
        }

        let mut conn = self.pool.acquire().await?;
        let (id, created) =
            db::upsert_catalogue(&mut conn, &name, &self.policy.source_lang, culture, Utc::now())
                .await?;
        if created {
            info!(catalogue = %name, id, "catalogue created");
            Ok(SourceCheck::Created(id))
        } else {
            Ok(SourceCheck::Existing(id))
        }
    }

    /// Queue a source string that has no translation yet.
    pub fn append(&mut self, message: impl Into<String>) {
        let message = message.into();
        if message.trim().is_empty() || self.untranslated.contains(&message) {
            return;
        }
        self.untranslated.push(message);
    }

    pub fn untranslated(&self) -> &[String] {
        &self.untranslated
    }

    /// Store every queued string in `catalogue` with an empty target.
    /// Strings already present are skipped. The queue is cleared only when
    /// the whole batch commits. Returns the number of inserted units.
    #[instrument(skip(self))]
    pub async fn save(&mut self, catalogue: &str) -> Result<usize> {
        if self.untranslated.is_empty() {
            return Err(CatalogError::EmptyBatch);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let target = self.lock_catalogue(&mut tx, catalogue, SYSTEM_USER, now).await?;
        let mut inserted = 0;
        for message in &self.untranslated {
            if db::source_exists(&mut tx, target.id, message).await? {
                debug!(source = %message, "already stored; skipping");
                continue;
            }
            let unit = NewUnit {
                catalogue_id: target.id,
                source: message,
                target: "",
                comments: SAVE_COMMENT,
                user_id: SYSTEM_USER,
                at: now,
            };
            db::insert_unit(&mut tx, &unit).await?;
            inserted += 1;
        }
        if inserted > 0 {
            tx.commit().await?;
        } else {
            // Nothing new: keep the previous timestamp.
            tx.rollback().await?;
        }

        self.untranslated.clear();
        if inserted > 0 {
            self.invalidate_resolved(&target).await;
        }
        info!(catalogue = %target.variant, inserted, "untranslated messages saved");
        Ok(inserted)
    }

    /// Insert one translated unit.
    #[instrument(skip(self, target, comments))]
    pub async fn add(
        &self,
        source: &str,
        target: &str,
        comments: &str,
        catalogue: &str,
        user_id: i64,
    ) -> Result<i64> {
        if source.is_empty() {
            return Err(CatalogError::Validation("source must be non-empty"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let resolved = self.lock_catalogue(&mut tx, catalogue, user_id, now).await?;
        if db::source_exists(&mut tx, resolved.id, source).await? {
            return Err(CatalogError::Duplicate {
                catalogue: resolved.variant,
                text: source.to_string(),
            });
        }
        let unit = NewUnit {
            catalogue_id: resolved.id,
            source,
            target,
            comments,
            user_id,
            at: now,
        };
        let id = db::insert_unit(&mut tx, &unit).await?;
        tx.commit().await?;

        self.invalidate_resolved(&resolved).await;
        info!(catalogue = %resolved.variant, id, "translation added");
        Ok(id)
    }

    /// Replace target and comments of the unit whose source matches exactly.
    #[instrument(skip(self, target, comments))]
    pub async fn update(
        &self,
        source: &str,
        target: &str,
        comments: &str,
        catalogue: &str,
    ) -> Result<()> {
        if source.is_empty() {
            return Err(CatalogError::Validation("source must be non-empty"));
        }
        if target.is_empty() {
            return Err(CatalogError::Validation("target must be non-empty"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let resolved = self.lock_catalogue(&mut tx, catalogue, SYSTEM_USER, now).await?;
        let rows = db::update_unit(&mut tx, resolved.id, source, target, comments, now).await?;
        Self::expect_single(rows, &resolved, source)?;
        tx.commit().await?;

        self.invalidate_resolved(&resolved).await;
        info!(catalogue = %resolved.variant, "translation updated");
        Ok(())
    }

    /// Remove the unit whose source matches exactly.
    #[instrument(skip(self))]
    pub async fn delete(&self, source: &str, catalogue: &str) -> Result<()> {
        if source.is_empty() {
            return Err(CatalogError::Validation("source must be non-empty"));
        }

        let mut tx = self.pool.begin().await?;
        let resolved = self
            .lock_catalogue(&mut tx, catalogue, SYSTEM_USER, Utc::now())
            .await?;
        let rows = db::delete_unit(&mut tx, resolved.id, source).await?;
        Self::expect_single(rows, &resolved, source)?;
        tx.commit().await?;

        self.invalidate_resolved(&resolved).await;
        info!(catalogue = %resolved.variant, "translation deleted");
        Ok(())
    }

    /// Every stored catalogue, ordered by name.
    #[instrument(skip(self))]
    pub async fn catalogues(&self) -> Result<Vec<CatalogueName>> {
        let names = db::list_catalogue_names(&self.pool).await?;
        Ok(names.iter().map(|n| CatalogueName::split(n)).collect())
    }

    /// When the catalogue last changed, or `None` if it does not exist.
    #[instrument(skip(self))]
    pub async fn last_modified(&self, variant: &str) -> Result<Option<chrono::DateTime<Utc>>> {
        let (name, _) = self.qualify(variant)?;
        Ok(db::catalogue_updated_at(&self.pool, &name).await?)
    }

    /// Catalogue contents plus its modification time.
    pub async fn export(&self, variant: &str) -> Result<CatalogueExport> {
        let (name, _) = self.qualify(variant)?;
        let updated_at = self.last_modified(&name).await?;
        if updated_at.is_none() {
            return Err(CatalogError::CatalogueNotFound(name));
        }
        Ok(CatalogueExport {
            name,
            updated_at,
            messages: self.load_data(variant).await?,
        })
    }

    /// Drop the cache entry of `catalogue` without touching storage.
    /// Returns whether the cache held an entry; `false` when no cache is
    /// configured.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, catalogue: &str) -> Result<bool> {
        let (variant, culture) = self.qualify(catalogue)?;
        Ok(self.invalidate_key(&variant, &culture).await)
    }

    /// `messages` → (`messages.<culture>`, culture); qualified names keep
    /// their own culture.
    fn qualify(&self, catalogue: &str) -> Result<(String, String)> {
        let parsed = Variant::parse(catalogue)
            .ok_or_else(|| CatalogError::InvalidVariant(catalogue.to_string()))?;
        let culture = parsed.culture_or(&self.culture).to_string();
        Ok((parsed.qualified(&self.culture), culture))
    }

    /// Refresh the catalogue's `updated_at` and return its id. Must be the
    /// first statement of the transaction: the write lock is taken before
    /// any read. A later error rolls the refresh back.
    async fn lock_catalogue(
        &self,
        conn: &mut sqlx::SqliteConnection,
        catalogue: &str,
        user_id: i64,
        at: chrono::DateTime<Utc>,
    ) -> Result<Resolved> {
        let (variant, culture) = self.qualify(catalogue)?;
        match db::touch_catalogue(conn, &variant, user_id, at).await? {
            Some(id) => Ok(Resolved {
                id,
                variant,
                culture,
            }),
            None => Err(CatalogError::CatalogueNotFound(variant)),
        }
    }

    fn expect_single(rows: u64, resolved: &Resolved, source: &str) -> Result<()> {
        match rows {
            1 => Ok(()),
            0 => Err(CatalogError::MessageNotFound {
                catalogue: resolved.variant.clone(),
                text: source.to_string(),
            }),
            n => Err(CatalogError::Ambiguous {
                catalogue: resolved.variant.clone(),
                text: source.to_string(),
                rows: n,
            }),
        }
    }

    async fn invalidate_resolved(&self, resolved: &Resolved) {
        self.invalidate_key(&resolved.variant, &resolved.culture).await;
    }

    async fn invalidate_key(&self, variant: &str, culture: &str) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let key = cache::variant_key(variant, culture);
        match cache.remove(&key).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(?err, key = %key, "cache invalidation failed");
                false
            }
        }
    }
}
