//! 路径与名字

use crate::{Error, Result};

pub const SEPARATOR: char = '/';

/// 名字不能为空，不能是`.`或`..`，也不能含有分隔符或`\0`
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(SEPARATOR)
        && !name.contains('\0');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_owned()))
    }
}

#[inline]
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// 路径中的各段名字，忽略空段与`.`
pub(crate) fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR)
        .filter(|name| !name.is_empty() && *name != ".")
}

/// 拆成父目录路径与最后一段名字，`"/a/b/"`拆成`("/a", "b")`
pub(crate) fn split_parent(path: &str) -> Option<(&str, &str)> {
    let path = path.trim_end_matches(SEPARATOR);
    let (parent, name) = path.rsplit_once(SEPARATOR).unwrap_or(("", path));
    (!name.is_empty()).then_some((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        validate_name("a.txt").unwrap();
        validate_name("中文").unwrap();
        for bad in ["", ".", "..", "a/b", "nul\0"] {
            assert!(matches!(validate_name(bad), Err(Error::InvalidName(_))));
        }
    }

    #[test]
    fn split() {
        assert_eq!(
            vec!["a", "b", "c"],
            components("/a//b/./c/").collect::<Vec<_>>()
        );
        assert_eq!(0, components("/").count());

        assert_eq!(Some(("/a", "b")), split_parent("/a/b/"));
        assert_eq!(Some(("", "a")), split_parent("/a"));
        assert_eq!(Some(("", "a")), split_parent("a"));
        assert_eq!(None, split_parent("/"));
        assert!(is_absolute("/a"));
        assert!(!is_absolute("a"));
    }
}
