//! Bundles (subscription tiers), billing cycles and credit packs.
//!
//! Bundles are stored as upper-case text in `users.bundle`. All feature
//! gating goes through [`Entitlements`], which treats an expired bundle as
//! `FREE`.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Subscription tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bundle {
    Free,
    Starter,
    Pro,
    Enterprise,
}

/// Billing cycle chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl Bundle {
    pub const ALL: [Bundle; 4] = [Bundle::Free, Bundle::Starter, Bundle::Pro, Bundle::Enterprise];

    pub fn as_str(self) -> &'static str {
        match self {
            Bundle::Free => "FREE",
            Bundle::Starter => "STARTER",
            Bundle::Pro => "PRO",
            Bundle::Enterprise => "ENTERPRISE",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Bundle::Free => "Free",
            Bundle::Starter => "Starter",
            Bundle::Pro => "Pro",
            Bundle::Enterprise => "Enterprise",
        }
    }

    /// Credits granted when the bundle is activated (or on registration for FREE).
    pub fn included_credits(self) -> i64 {
        match self {
            Bundle::Free => 5,
            Bundle::Starter => 50,
            Bundle::Pro => 200,
            Bundle::Enterprise => 1000,
        }
    }

    /// Gross price in EUR cents, `None` for the free tier.
    pub fn price_cents(self, cycle: BillingCycle) -> Option<i64> {
        match (self, cycle) {
            (Bundle::Free, _) => None,
            (Bundle::Starter, BillingCycle::Monthly) => Some(2_900),
            (Bundle::Starter, BillingCycle::Yearly) => Some(29_000),
            (Bundle::Pro, BillingCycle::Monthly) => Some(7_900),
            (Bundle::Pro, BillingCycle::Yearly) => Some(79_000),
            (Bundle::Enterprise, BillingCycle::Monthly) => Some(19_900),
            (Bundle::Enterprise, BillingCycle::Yearly) => Some(199_000),
        }
    }

    /// Maximum number of websites, `None` means unlimited.
    pub fn max_websites(self) -> Option<i64> {
        match self {
            Bundle::Free => Some(1),
            Bundle::Starter => Some(3),
            Bundle::Pro => Some(10),
            Bundle::Enterprise => None,
        }
    }

    /// Team seats besides the owner.
    pub fn team_seats(self) -> i64 {
        match self {
            Bundle::Free | Bundle::Starter => 0,
            Bundle::Pro => 5,
            Bundle::Enterprise => 25,
        }
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bundle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Bundle::Free),
            "STARTER" => Ok(Bundle::Starter),
            "PRO" => Ok(Bundle::Pro),
            "ENTERPRISE" => Ok(Bundle::Enterprise),
            other => Err(AppError::InvalidRequest(format!("Unbekanntes Paket: {other}"))),
        }
    }
}

impl BillingCycle {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// Expiry of a bundle bought at `now`.
    ///
    /// Yearly bundles run 365 days. Monthly bundles carry no expiry and stay
    /// active until changed by an admin or a new purchase.
    pub fn expiry_from(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            BillingCycle::Monthly => None,
            BillingCycle::Yearly => Some(now + Duration::days(365)),
        }
    }
}

impl FromStr for BillingCycle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(AppError::InvalidRequest(format!(
                "Unbekannter Abrechnungszeitraum: {other}"
            ))),
        }
    }
}

/// A standalone credit pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPack {
    pub id: &'static str,
    pub credits: i64,
    pub price_cents: i64,
}

pub const CREDIT_PACKS: [CreditPack; 3] = [
    CreditPack {
        id: "credits_10",
        credits: 10,
        price_cents: 990,
    },
    CreditPack {
        id: "credits_50",
        credits: 50,
        price_cents: 3_990,
    },
    CreditPack {
        id: "credits_100",
        credits: 100,
        price_cents: 6_990,
    },
];

pub fn find_credit_pack(id: &str) -> Option<CreditPack> {
    CREDIT_PACKS.iter().copied().find(|p| p.id == id)
}

/// Credit cost of each metered action.
pub mod costs {
    pub const COACH_MESSAGE: i64 = 1;
    pub const SCAN: i64 = 1;
    pub const BFE_STATEMENT: i64 = 3;
}

/// Effective feature set of a user at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlements {
    pub bundle: Bundle,
}

impl Entitlements {
    /// Resolve the effective bundle, falling back to FREE once expired.
    pub fn resolve(bundle: Bundle, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let bundle = match expires_at {
            Some(expiry) if expiry <= now => Bundle::Free,
            _ => bundle,
        };
        Self { bundle }
    }

    pub fn require_coach(&self) -> Result<(), AppError> {
        if self.bundle >= Bundle::Starter {
            Ok(())
        } else {
            Err(AppError::FeatureNotInPlan(
                "Der WCAG-Coach ist ab dem Starter-Paket verfügbar".to_string(),
            ))
        }
    }

    pub fn require_html_export(&self) -> Result<(), AppError> {
        if self.bundle >= Bundle::Pro {
            Ok(())
        } else {
            Err(AppError::FeatureNotInPlan(
                "Der HTML-Export ist ab dem Pro-Paket verfügbar".to_string(),
            ))
        }
    }

    pub fn require_website_slot(&self, current: i64) -> Result<(), AppError> {
        match self.bundle.max_websites() {
            Some(max) if current >= max => Err(AppError::FeatureNotInPlan(format!(
                "Ihr Paket {} erlaubt maximal {} Website(s)",
                self.bundle.display_name(),
                max
            ))),
            _ => Ok(()),
        }
    }

    pub fn require_team_seat(&self, used: i64) -> Result<(), AppError> {
        let seats = self.bundle.team_seats();
        if seats == 0 {
            return Err(AppError::FeatureNotInPlan(
                "Teams sind ab dem Pro-Paket verfügbar".to_string(),
            ));
        }
        if used >= seats {
            return Err(AppError::FeatureNotInPlan(format!(
                "Alle {seats} Team-Plätze Ihres Pakets sind belegt"
            )));
        }
        Ok(())
    }
}

/// One row of the public price list.
#[derive(Debug, Serialize)]
pub struct BundleOffer {
    pub bundle: Bundle,
    pub name: &'static str,
    pub credits: i64,
    pub monthly_price_cents: Option<i64>,
    pub yearly_price_cents: Option<i64>,
    pub max_websites: Option<i64>,
    pub team_seats: i64,
}

impl From<Bundle> for BundleOffer {
    fn from(bundle: Bundle) -> Self {
        Self {
            bundle,
            name: bundle.display_name(),
            credits: bundle.included_credits(),
            monthly_price_cents: bundle.price_cents(BillingCycle::Monthly),
            yearly_price_cents: bundle.price_cents(BillingCycle::Yearly),
            max_websites: bundle.max_websites(),
            team_seats: bundle.team_seats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_parses_case_insensitively() {
        assert_eq!("pro".parse::<Bundle>().unwrap(), Bundle::Pro);
        assert_eq!("ENTERPRISE".parse::<Bundle>().unwrap(), Bundle::Enterprise);
        assert!("GOLD".parse::<Bundle>().is_err());
    }

    #[test]
    fn expired_bundle_falls_back_to_free() {
        let now = Utc::now();
        let expired = Entitlements::resolve(Bundle::Pro, Some(now - Duration::days(1)), now);
        assert_eq!(expired.bundle, Bundle::Free);

        let active = Entitlements::resolve(Bundle::Pro, Some(now + Duration::days(1)), now);
        assert_eq!(active.bundle, Bundle::Pro);

        let open_ended = Entitlements::resolve(Bundle::Starter, None, now);
        assert_eq!(open_ended.bundle, Bundle::Starter);
    }

    #[test]
    fn coach_requires_starter() {
        assert!(Entitlements { bundle: Bundle::Free }.require_coach().is_err());
        assert!(Entitlements { bundle: Bundle::Starter }.require_coach().is_ok());
    }

    #[test]
    fn website_limit_is_enforced_per_bundle() {
        let free = Entitlements { bundle: Bundle::Free };
        assert!(free.require_website_slot(0).is_ok());
        assert!(free.require_website_slot(1).is_err());

        let enterprise = Entitlements {
            bundle: Bundle::Enterprise,
        };
        assert!(enterprise.require_website_slot(500).is_ok());
    }

    #[test]
    fn team_seats_only_from_pro() {
        assert!(Entitlements { bundle: Bundle::Starter }.require_team_seat(0).is_err());
        let pro = Entitlements { bundle: Bundle::Pro };
        assert!(pro.require_team_seat(4).is_ok());
        assert!(pro.require_team_seat(5).is_err());
    }

    #[test]
    fn yearly_cycle_sets_expiry() {
        let now = Utc::now();
        assert_eq!(BillingCycle::Monthly.expiry_from(now), None);
        assert_eq!(
            BillingCycle::Yearly.expiry_from(now),
            Some(now + Duration::days(365))
        );
    }

    #[test]
    fn free_bundle_has_no_price() {
        assert_eq!(Bundle::Free.price_cents(BillingCycle::Yearly), None);
        assert_eq!(Bundle::Pro.price_cents(BillingCycle::Monthly), Some(7_900));
    }

    #[test]
    fn credit_pack_lookup() {
        assert_eq!(find_credit_pack("credits_50").map(|p| p.credits), Some(50));
        assert!(find_credit_pack("credits_7").is_none());
    }
}
