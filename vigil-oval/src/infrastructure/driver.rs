//! Local OVAL database access

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vigil_core::DetectionError;
use vigil_core::domain::Family;

use crate::domain::AdvisoryDefinition;

/// Read access to a local OVAL database
///
/// `family` is the family whose feed is queried, which differs from the host
/// family for rebuilds (CentOS reads the RedHat feed).
#[async_trait]
pub trait OvalDriver: Send + Sync {
    /// Definitions that list `package` for the release
    async fn get_by_pack_name(
        &self,
        family: Family,
        release: &str,
        package: &str,
        arch: &str,
    ) -> Result<Vec<AdvisoryDefinition>, DetectionError>;

    /// Whether definitions for the release were ever fetched
    async fn has_data(&self, family: Family, release: &str) -> Result<bool, DetectionError>;

    /// When the definitions for the release were last refreshed
    async fn last_modified(
        &self,
        family: Family,
        release: &str,
    ) -> Result<Option<DateTime<Utc>>, DetectionError>;
}
