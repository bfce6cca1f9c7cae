/// Known services, most specific fragments first
const DEFAULT_APPS: &[(&str, &str)] = &[
    ("youtube", "YouTube"),
    ("googlevideo", "YouTube"),
    ("ytimg", "YouTube"),
    ("facebook", "Facebook"),
    ("fbcdn", "Facebook"),
    ("instagram", "Instagram"),
    ("whatsapp", "WhatsApp"),
    ("netflix", "Netflix"),
    ("nflxvideo", "Netflix"),
    ("twitter", "Twitter"),
    ("twimg", "Twitter"),
    ("tiktok", "TikTok"),
    ("spotify", "Spotify"),
    ("discord", "Discord"),
    ("zoom", "Zoom"),
    ("teams.microsoft", "Microsoft Teams"),
    ("microsoft", "Microsoft"),
    ("github", "GitHub"),
    ("amazon", "Amazon"),
    ("cloudflare", "Cloudflare"),
    ("apple", "Apple"),
    ("icloud", "Apple"),
    ("telegram", "Telegram"),
    ("linkedin", "LinkedIn"),
    ("reddit", "Reddit"),
    ("gmail", "Gmail"),
    ("google", "Google"),
];

/// One classification entry: a lower-case domain fragment and its application label
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppEntry {
    pub fragment: String,
    pub label: String,
}

/// Ordered, immutable domain fragment to application table
///
/// Built once and shared between inspectors; the first matching entry wins.
#[derive(Clone, Debug)]
pub struct AppTable {
    entries: Vec<AppEntry>,
}

impl Default for AppTable {
    fn default() -> Self {
        AppTable::new(DEFAULT_APPS.iter().copied())
    }
}

impl AppTable {
    /// Build a table from (fragment, label) pairs. Fragments are lower-cased, empty ones dropped.
    pub fn new<I, S, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: Into<String>,
    {
        let entries = entries
            .into_iter()
            .filter(|(fragment, _)| !fragment.as_ref().is_empty())
            .map(|(fragment, label)| AppEntry {
                fragment: fragment.as_ref().to_ascii_lowercase(),
                label: label.into(),
            })
            .collect();
        AppTable { entries }
    }

    pub fn entries(&self) -> &[AppEntry] {
        &self.entries
    }

    /// Label of the first entry whose fragment appears in `name` (case-insensitive)
    pub fn classify(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|e| name.contains(&e.fragment))
            .map(|e| e.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::AppTable;

    #[test]
    fn classify_default_table() {
        let table = AppTable::default();
        assert_eq!(table.classify("www.YouTube.com"), Some("YouTube"));
        assert_eq!(table.classify("r3---sn-5hne6nzd.googlevideo.com"), Some("YouTube"));
        assert_eq!(table.classify("mail.google.com"), Some("Google"));
        assert_eq!(table.classify("teams.microsoft.com"), Some("Microsoft Teams"));
        assert_eq!(table.classify("login.microsoftonline.com"), Some("Microsoft"));
        assert_eq!(table.classify("www.example.com"), None);
    }

    #[test]
    fn classify_order_matters() {
        let table = AppTable::new([("google", "Google"), ("googlevideo", "Video")]);
        assert_eq!(table.classify("x.googlevideo.com"), Some("Google"));
        let table = AppTable::new([("", "Empty"), ("Corp", "Corp")]);
        assert_eq!(table.entries().len(), 1);
        assert_eq!(table.classify("intranet.corp.local"), Some("Corp"));
    }
}
