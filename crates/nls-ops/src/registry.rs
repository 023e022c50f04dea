//! Operation registry: the full table of dispatchable entry points.
//!
//! Bindings (e.g. the Python module) register one function per entry; the
//! table is also the single source of truth for what the crate exposes.

/// The eight operation families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Gather,
    Scatter,
    Search,
    Fold,
    Unfold,
    Iunfold,
    Xsearch,
    Wpsum,
}

impl Family {
    pub const ALL: [Family; 8] = [
        Family::Gather,
        Family::Scatter,
        Family::Search,
        Family::Fold,
        Family::Unfold,
        Family::Iunfold,
        Family::Xsearch,
        Family::Wpsum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Gather => "gather",
            Family::Scatter => "scatter",
            Family::Search => "search",
            Family::Fold => "fold",
            Family::Unfold => "unfold",
            Family::Iunfold => "iunfold",
            Family::Xsearch => "xsearch",
            Family::Wpsum => "wpsum",
        }
    }
}

/// Forward or backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Forward,
    Backward,
}

/// One dispatchable operation.
#[derive(Debug, Clone, Copy)]
pub struct OpEntry {
    pub name: &'static str,
    pub family: Family,
    pub pass: Pass,
}

macro_rules! op {
    ($name:literal, $family:ident, $pass:ident) => {
        OpEntry {
            name: $name,
            family: Family::$family,
            pass: Pass::$pass,
        }
    };
}

/// Every operation the crate exposes, forward and backward per family.
pub const OPS: &[OpEntry] = &[
    op!("gather_forward", Gather, Forward),
    op!("gather_backward", Gather, Backward),
    op!("scatter_forward", Scatter, Forward),
    op!("scatter_backward", Scatter, Backward),
    op!("search_forward", Search, Forward),
    op!("search_backward", Search, Backward),
    op!("fold_forward", Fold, Forward),
    op!("fold_backward", Fold, Backward),
    op!("unfold_forward", Unfold, Forward),
    op!("unfold_backward", Unfold, Backward),
    op!("iunfold_forward", Iunfold, Forward),
    op!("iunfold_backward", Iunfold, Backward),
    op!("xsearch_forward", Xsearch, Forward),
    op!("xsearch_backward", Xsearch, Backward),
    op!("wpsum_forward", Wpsum, Forward),
    op!("wpsum_backward", Wpsum, Backward),
];

/// Look up an operation by its registered name.
pub fn lookup(name: &str) -> Option<&'static OpEntry> {
    OPS.iter().find(|op| op.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_two_passes_per_family() {
        assert_eq!(OPS.len(), 2 * Family::ALL.len());
        for family in Family::ALL {
            let passes: Vec<_> = OPS.iter().filter(|op| op.family == family).collect();
            assert_eq!(passes.len(), 2, "{}", family.as_str());
            assert!(passes.iter().any(|op| op.pass == Pass::Forward));
            assert!(passes.iter().any(|op| op.pass == Pass::Backward));
        }
    }

    #[test]
    fn test_names_unique_and_derived_from_family() {
        let names: HashSet<_> = OPS.iter().map(|op| op.name).collect();
        assert_eq!(names.len(), OPS.len());
        for op in OPS {
            assert!(op.name.starts_with(op.family.as_str()));
        }
    }

    #[test]
    fn test_lookup() {
        let entry = lookup("wpsum_backward").unwrap();
        assert_eq!(entry.family, Family::Wpsum);
        assert_eq!(entry.pass, Pass::Backward);
        assert!(lookup("wpsum").is_none());
    }
}
