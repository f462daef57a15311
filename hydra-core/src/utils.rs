//! Utility functions shared by the routing layer
//!
//! Path and string helpers used when building controller routes and when
//! printing the route table at startup.

/// Path helpers for controller roots and route patterns
pub mod path {
    /// Collapses every run of `/` into a single slash.
    ///
    /// # Examples
    ///
    /// ```
    /// use hydra_core::utils::path::collapse_slashes;
    ///
    /// assert_eq!(collapse_slashes("/users//:id"), "/users/:id");
    /// assert_eq!(collapse_slashes("///"), "/");
    /// assert_eq!(collapse_slashes("users"), "users");
    /// ```
    pub fn collapse_slashes(path: &str) -> String {
        let mut result = String::with_capacity(path.len());
        let mut previous_slash = false;

        for ch in path.chars() {
            if ch == '/' {
                if !previous_slash {
                    result.push(ch);
                }
                previous_slash = true;
            } else {
                result.push(ch);
                previous_slash = false;
            }
        }

        result
    }

    /// Makes sure the path ends with exactly one trailing slash.
    ///
    /// An empty input becomes `/`.
    ///
    /// # Examples
    ///
    /// ```
    /// use hydra_core::utils::path::with_trailing_slash;
    ///
    /// assert_eq!(with_trailing_slash("/users"), "/users/");
    /// assert_eq!(with_trailing_slash("/users/"), "/users/");
    /// assert_eq!(with_trailing_slash(""), "/");
    /// ```
    pub fn with_trailing_slash(path: &str) -> String {
        if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        }
    }

    /// Joins a controller root and a route path, collapsing duplicate separators.
    pub fn join(root: &str, path: &str) -> String {
        collapse_slashes(&format!("{}{}", root, path))
    }
}

/// String formatting helpers
pub mod text {
    /// Pads `s` on the right with `fill` until it is `width` characters long.
    ///
    /// Strings that are already long enough are returned unchanged.
    pub fn pad_end(s: &str, fill: char, width: usize) -> String {
        let len = s.chars().count();
        if len >= width {
            return s.to_string();
        }

        let mut result = String::with_capacity(width);
        result.push_str(s);
        result.extend(std::iter::repeat(fill).take(width - len));
        result
    }
}

#[cfg(test)]
mod tests {
    mod path_tests {
        use super::super::path::*;

        #[test]
        fn test_collapse_slashes() {
            assert_eq!(collapse_slashes("/api//users///:id"), "/api/users/:id");
            assert_eq!(collapse_slashes("/"), "/");
            assert_eq!(collapse_slashes(""), "");
        }

        #[test]
        fn test_join() {
            assert_eq!(join("/users/", "/:id"), "/users/:id");
            assert_eq!(join("/", "/"), "/");
            assert_eq!(join("/admin/", "stats"), "/admin/stats");
        }

        #[test]
        fn test_with_trailing_slash() {
            assert_eq!(with_trailing_slash("/api"), "/api/");
            assert_eq!(with_trailing_slash("/"), "/");
        }
    }

    mod text_tests {
        use super::super::text::*;

        #[test]
        fn test_pad_end() {
            assert_eq!(pad_end("GET", ' ', 7), "GET    ");
            assert_eq!(pad_end("OPTIONS", ' ', 7), "OPTIONS");
            assert_eq!(pad_end("PROPFIND", ' ', 7), "PROPFIND");
        }
    }
}
