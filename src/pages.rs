//! Route table of the dashboard and who may open each view.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAccess {
    Public,
    /// Needs an unlocked session.
    Private,
    /// Needs an unlocked session with an admin profile.
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Home,
    About,
    Loveletter,
    IntraGainers,
    TopGainers,
    LiveGainers,
    DataQuery,
    Chart,
    Profile,
    StockAnalyze,
    HealthCheck,
    DbOverview,
    EditChart,
    UserProfile,
    MongoExport,
    SendNotifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("{} requires login", .0.path())]
    LoginRequired(Page),
    #[error("{} is admin only", .0.path())]
    AdminRequired(Page),
}

impl Page {
    pub const ALL: [Page; 16] = [
        Page::Home,
        Page::About,
        Page::Loveletter,
        Page::IntraGainers,
        Page::TopGainers,
        Page::LiveGainers,
        Page::DataQuery,
        Page::Chart,
        Page::Profile,
        Page::StockAnalyze,
        Page::HealthCheck,
        Page::DbOverview,
        Page::EditChart,
        Page::UserProfile,
        Page::MongoExport,
        Page::SendNotifier,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Page::Home => "/",
            Page::About => "/about",
            Page::Loveletter => "/loveletter",
            Page::IntraGainers => "/intra-gainers",
            Page::TopGainers => "/top-gainers",
            Page::LiveGainers => "/live-gainers",
            Page::DataQuery => "/data-query",
            Page::Chart => "/chart",
            Page::Profile => "/profile",
            Page::StockAnalyze => "/stock-analyze",
            Page::HealthCheck => "/health-check",
            Page::DbOverview => "/db-overview",
            Page::EditChart => "/edit-chart",
            Page::UserProfile => "/user-profile",
            Page::MongoExport => "/mongo-export",
            Page::SendNotifier => "/send-notifier",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::About => "About",
            Page::Loveletter => "Love Letter",
            Page::IntraGainers => "Intra Gainers",
            Page::TopGainers => "Top Gainers",
            Page::LiveGainers => "Live Gainers",
            Page::DataQuery => "Data Query",
            Page::Chart => "Chart",
            Page::Profile => "Profile",
            Page::StockAnalyze => "Daily Report",
            Page::HealthCheck => "System Health",
            Page::DbOverview => "DB Overview",
            Page::EditChart => "Edit Chart",
            Page::UserProfile => "User Profile",
            Page::MongoExport => "DB Export",
            Page::SendNotifier => "Notifier",
        }
    }

    pub fn access(&self) -> PageAccess {
        match self {
            Page::Home | Page::About | Page::Loveletter | Page::IntraGainers => PageAccess::Public,
            Page::TopGainers
            | Page::LiveGainers
            | Page::DataQuery
            | Page::Chart
            | Page::Profile
            | Page::StockAnalyze
            | Page::HealthCheck => PageAccess::Private,
            Page::DbOverview
            | Page::EditChart
            | Page::UserProfile
            | Page::MongoExport
            | Page::SendNotifier => PageAccess::Admin,
        }
    }

    pub fn from_path(path: &str) -> Option<Page> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        Page::ALL.into_iter().find(|p| p.path() == path)
    }

    /// Navigation entries for the current session, in menu order.
    pub fn menu(unlocked: bool, admin: bool) -> Vec<Page> {
        let mut out = vec![Page::Home, Page::About];
        if unlocked {
            out.extend([
                Page::TopGainers,
                Page::IntraGainers,
                Page::StockAnalyze,
                Page::LiveGainers,
                Page::DataQuery,
                Page::Chart,
                Page::HealthCheck,
                Page::Profile,
            ]);
            if admin {
                out.extend([
                    Page::DbOverview,
                    Page::UserProfile,
                    Page::EditChart,
                    Page::MongoExport,
                    Page::SendNotifier,
                ]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unique_and_round_trip() {
        for page in Page::ALL {
            assert_eq!(Page::from_path(page.path()), Some(page));
        }
        assert_eq!(Page::from_path("/top-gainers/"), Some(Page::TopGainers));
        assert_eq!(Page::from_path(""), Some(Page::Home));
        assert_eq!(Page::from_path("/nope"), None);
    }

    #[test]
    fn test_menu_by_role() {
        assert_eq!(Page::menu(false, false), vec![Page::Home, Page::About]);

        let normal = Page::menu(true, false);
        assert!(normal.contains(&Page::LiveGainers));
        assert!(!normal.iter().any(|p| p.access() == PageAccess::Admin));

        let admin = Page::menu(true, true);
        assert!(admin.contains(&Page::MongoExport));
        assert_eq!(admin.len(), normal.len() + 5);
    }

    #[test]
    fn test_denial_messages() {
        assert_eq!(
            AccessDenied::LoginRequired(Page::Chart).to_string(),
            "/chart requires login"
        );
        assert_eq!(
            AccessDenied::AdminRequired(Page::UserProfile).to_string(),
            "/user-profile is admin only"
        );
    }
}
