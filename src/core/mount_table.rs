use crate::config::MountConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub prefix: String,
    pub root: String,
}

/// Ordered prefix to directory bindings, immutable once built.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn new(mounts: Vec<Mount>) -> Self {
        Self { mounts }
    }

    pub fn from_config(mounts: &[MountConfig]) -> Self {
        Self::new(
            mounts
                .iter()
                .map(|m| Mount {
                    prefix: m.prefix.clone(),
                    root: m.root.clone(),
                })
                .collect(),
        )
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Longest mount whose prefix covers `path`, with the remainder below it.
    ///
    /// A prefix matches on a segment boundary only, so `/uv` covers `/uv` and
    /// `/uv/x.js` but not `/uvx`. Equal lengths go to the earlier entry.
    pub fn find<'a, 'p>(&'a self, path: &'p str) -> Option<(&'a Mount, &'p str)> {
        let mut best: Option<(&Mount, &str)> = None;
        for mount in &self.mounts {
            let Some(rest) = strip_mount_prefix(path, &mount.prefix) else {
                continue;
            };
            if best.is_none_or(|(current, _)| mount.prefix.len() > current.prefix.len()) {
                best = Some((mount, rest));
            }
        }
        best.map(|(mount, rest)| (mount, rest.trim_start_matches('/')))
    }
}

fn strip_mount_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let rest = path.strip_prefix(prefix)?;
    if prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MountTable {
        MountTable::from_config(&MountConfig::defaults())
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table();

        let (mount, rest) = table.find("/uv/foo.js").unwrap();
        assert_eq!(mount.prefix, "/uv/");
        assert_eq!(rest, "foo.js");

        let (mount, rest) = table.find("/index.html").unwrap();
        assert_eq!(mount.prefix, "/");
        assert_eq!(rest, "index.html");

        let (mount, _) = table.find("/uvx/foo.js").unwrap();
        assert_eq!(mount.prefix, "/");
    }

    #[test]
    fn test_segment_boundary() {
        let table = MountTable::new(vec![Mount {
            prefix: "/assets".to_string(),
            root: "a".to_string(),
        }]);

        assert_eq!(table.find("/assets").unwrap().1, "");
        assert_eq!(table.find("/assets/app.js").unwrap().1, "app.js");
        assert!(table.find("/assetsx").is_none());
        assert!(table.find("/other").is_none());
    }

    #[test]
    fn test_ties_go_to_earlier_entry() {
        let table = MountTable::new(vec![
            Mount {
                prefix: "/lib/".to_string(),
                root: "first".to_string(),
            },
            Mount {
                prefix: "/lib/".to_string(),
                root: "second".to_string(),
            },
        ]);

        assert_eq!(table.find("/lib/a.js").unwrap().0.root, "first");
    }

    #[test]
    fn test_empty_table() {
        assert!(MountTable::default().find("/").is_none());
    }
}
