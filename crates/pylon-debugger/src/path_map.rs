/// One directory-prefix rewrite rule.
///
/// `local` is the debugging host's view of the sources, `remote` the
/// debuggee's view of the same tree (e.g. a cluster deployment share).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathMapping {
    pub local: String,
    pub remote: String,
}

/// Ordered directory mappings between the debugger host's source tree and
/// the debuggee's deployed copy.
///
/// Breakpoints are set against locally edited files; on the wire their
/// paths must name the deployed copies, and paths reported by the target
/// must map back. Matching is a case-insensitive prefix comparison; the
/// first matching pair wins and unmatched paths pass through unchanged.
#[derive(Clone, Debug, Default)]
pub struct PathMappings {
    mappings: Vec<PathMapping>,
}

impl PathMappings {
    pub fn new(mappings: Vec<PathMapping>) -> Self {
        Self { mappings }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn map_to_debuggee(&self, file: &str) -> String {
        self.map(file, true)
    }

    pub fn map_to_host(&self, file: &str) -> String {
        self.map(file, false)
    }

    fn map(&self, file: &str, to_debuggee: bool) -> String {
        for mapping in &self.mappings {
            let (from, to) = if to_debuggee {
                (&mapping.local, &mapping.remote)
            } else {
                (&mapping.remote, &mapping.local)
            };

            if let Some(mapped) = map_prefix(file, from, to) {
                tracing::debug!(
                    target = "pylon.debugger",
                    from = file,
                    to = %mapped,
                    "mapped filename"
                );
                return mapped;
            }
        }
        file.to_string()
    }
}

fn map_prefix(file: &str, from: &str, to: &str) -> Option<String> {
    let head = file.get(..from.len())?;
    if !head.eq_ignore_ascii_case(from) {
        return None;
    }

    let rest = &file[from.len()..];
    if from.ends_with(['/', '\\']) {
        return Some(format!("{to}{rest}"));
    }
    // Prefix is a directory without its trailing separator; the remainder
    // must start at a component boundary.
    let rest = rest.strip_prefix(['/', '\\'])?;
    let sep = if to.contains('\\') { '\\' } else { '/' };
    Some(format!("{to}{sep}{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings() -> PathMappings {
        PathMappings::new(vec![
            PathMapping {
                local: "/home/me/project".to_string(),
                remote: "/srv/deploy/project".to_string(),
            },
            PathMapping {
                local: "/home/me".to_string(),
                remote: "/srv/other".to_string(),
            },
        ])
    }

    #[test]
    fn maps_matching_prefix() {
        assert_eq!(
            mappings().map_to_debuggee("/home/me/project/app/main.py"),
            "/srv/deploy/project/app/main.py"
        );
    }

    #[test]
    fn first_matching_pair_wins() {
        // Both pairs match; the first configured one is used.
        assert_eq!(
            mappings().map_to_debuggee("/home/me/project/x.py"),
            "/srv/deploy/project/x.py"
        );
    }

    #[test]
    fn match_is_case_insensitive() {
        assert_eq!(
            mappings().map_to_debuggee("/HOME/ME/PROJECT/x.py"),
            "/srv/deploy/project/x.py"
        );
    }

    #[test]
    fn round_trips_through_inverse_direction() {
        let m = mappings();
        let original = "/home/me/project/pkg/mod.py";
        let there = m.map_to_debuggee(original);
        assert_eq!(m.map_to_host(&there), original);
    }

    #[test]
    fn unmatched_path_passes_through_both_directions() {
        let m = mappings();
        assert_eq!(m.map_to_debuggee("/var/tmp/x.py"), "/var/tmp/x.py");
        assert_eq!(m.map_to_host("/var/tmp/x.py"), "/var/tmp/x.py");
    }

    #[test]
    fn prefix_must_end_on_a_component_boundary() {
        // "/home/me/projectile" must not match the "/home/me/project" pair,
        // but it does match the shorter "/home/me" pair.
        assert_eq!(
            mappings().map_to_debuggee("/home/me/projectile/x.py"),
            "/srv/other/projectile/x.py"
        );
    }

    #[test]
    fn windows_style_pairs_keep_their_separator() {
        let m = PathMappings::new(vec![PathMapping {
            local: "C:\\Users\\Me\\Project".to_string(),
            remote: "\\\\cluster\\share\\Project".to_string(),
        }]);
        assert_eq!(
            m.map_to_debuggee("c:\\users\\me\\project\\foo.py"),
            "\\\\cluster\\share\\Project\\foo.py"
        );
    }
}
