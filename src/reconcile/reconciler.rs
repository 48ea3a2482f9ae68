use chrono::{DateTime, FixedOffset};

use crate::models::device::{DesiredRule, MacAddress};
use crate::models::window::Schedule;
use crate::router::gateway::RemoteRuleGateway;
use crate::router::GatewayError;
use crate::utils::clock::is_frozen;
use crate::{debug, info};

/// What one reconciliation did for a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Inside the last minute of the day; nothing was touched
    Frozen,

    /// The desired rule was written to the router
    Installed(DesiredRule),

    /// The remote rule already matched
    Unchanged,

    /// No window remains, and the remote rule was removed
    Removed,

    /// No window remains, and there was no remote rule
    NothingToRemove,
}

/// Bring the remote block rule for `mac` in line with `schedule`.
///
/// `now` must be in the same offset the schedule was located with. At most
/// one add or one remove is issued; on unchanged inputs a second call only
/// reads. Gateway errors are returned as is.
pub async fn reconcile<G>(
    mac: &MacAddress,
    schedule: &Schedule,
    now: &DateTime<FixedOffset>,
    gateway: &G,
) -> Result<ReconcileOutcome, GatewayError>
where
    G: RemoteRuleGateway + ?Sized,
{
    if is_frozen(now) {
        info!("Skipping {} between 23:59 and 00:00", mac);
        return Ok(ReconcileOutcome::Frozen);
    }

    // current first; with nothing active, pre-install the upcoming window
    let window = match (&schedule.current, &schedule.next) {
        (None, None) => {
            return match gateway.get_active_rule(mac).await? {
                Some(_) => {
                    gateway.remove_rule(mac).await?;
                    info!("No block window left for {}, removed its rule", mac);
                    Ok(ReconcileOutcome::Removed)
                }
                None => Ok(ReconcileOutcome::NothingToRemove),
            };
        }
        (Some(current), next) => {
            if next.as_ref() != Some(current) {
                debug!("{}: current window differs from next, a later cycle follows up", mac);
            }
            current
        }
        (None, Some(next)) => next,
    };

    let desired = DesiredRule::from_window(mac, window);
    let active = gateway.get_active_rule(mac).await?;
    debug!("{}: desired {} {}, active {:?}", mac, desired.week, desired.time, active);

    match active {
        Some(remote) if remote.matches(&desired) => Ok(ReconcileOutcome::Unchanged),
        active => {
            gateway
                .replace_rule(mac, active.as_ref(), &desired.week, &desired.time)
                .await?;
            Ok(ReconcileOutcome::Installed(desired))
        }
    }
}
