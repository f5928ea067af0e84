//! The group suffix at the tail of every repository filename.
//!
//! `basename._group` applies to members of `group`; the special suffix
//! `._all` applies to everyone. A `.post` segment in front of the suffix
//! marks the file as the post-script guarding its destination. Files ending
//! in `.saved` are engine backups and never overlay entries.

/// Outcome of resolving one filename against a client's group list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuffixResult {
    /// The entry applies to this client.
    Applies {
        /// Basename with the suffix (and any `.post` marker) stripped.
        name: String,
        /// Index of the suffix group in the client's group list; lower wins.
        priority: usize,
        /// True for `<base>.post._<group>` post-scripts.
        post: bool,
    },
    /// The suffix group is not one of ours; the entry simply does not apply.
    NotMine,
    /// No `._group` suffix at all (legacy layout); skip with a warning.
    NoSuffix,
    /// A `.saved` backup that strayed into the repository; skip silently.
    Saved,
}

/// Split the group suffix off `filename` and rank it against `my_groups`.
///
/// The suffix starts at the last `.` that is directly followed by `_`.
pub fn split_group(filename: &str, my_groups: &[String]) -> SuffixResult {
    if filename.ends_with(".saved") {
        return SuffixResult::Saved;
    }

    let Some(idx) = filename.rfind("._") else {
        return SuffixResult::NoSuffix;
    };
    let group = &filename[idx + 2..];
    if group.is_empty() {
        return SuffixResult::NoSuffix;
    }

    let Some(priority) = my_groups.iter().position(|g| g == group) else {
        return SuffixResult::NotMine;
    };

    let mut name = &filename[..idx];
    let post = name.ends_with(".post");
    if post {
        name = &name[..name.len() - ".post".len()];
    }

    SuffixResult::Applies {
        name: name.to_owned(),
        priority,
        post,
    }
}
