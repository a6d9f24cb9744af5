//! Text patterns applied to raw unified-diff output.
//!
//! Both matchers look at the whole diff and succeed on a match anywhere in
//! it. They are deliberately narrow: the predicate that uses them gates on
//! file and line counts first, so neither tries to prove that exactly one
//! dependency changed.

use std::sync::LazyLock;

use regex::Regex;

/// Name of the build manifest whose dependency bumps we detect.
const MANIFEST_FILE: &str = "pom.xml";

static MANIFEST_TOUCH: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?m)^\+{{3}}.*{}$", regex::escape(MANIFEST_FILE));
    Regex::new(&pattern).expect("Failed to compile manifest pattern")
});

// Two +/- lines carrying a <version> tag inside one <dependency> span.
static DEPENDENCY_VERSION_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?sm)<dependency>(.*^[+-]\s*<version>.+</version>.*){2}</dependency>")
        .expect("Failed to compile dependency version pattern")
});

/// Returns true if the diff has a `+++` header line naming a `pom.xml`.
pub fn touches_manifest(diff: &str) -> bool {
    MANIFEST_TOUCH.is_match(diff)
}

/// Returns true if a `<dependency>` block in the diff both removes and adds
/// a `<version>` line.
pub fn changes_dependency_version(diff: &str) -> bool {
    DEPENDENCY_VERSION_CHANGE.is_match(diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION_BUMP: &str = "\
diff --git a/pom.xml b/pom.xml
index 3f1c2a1..9b2e4d7 100644
--- a/pom.xml
+++ b/pom.xml
@@ -41,7 +41,7 @@
     <dependency>
       <groupId>com.fasterxml.jackson.core</groupId>
       <artifactId>jackson-databind</artifactId>
-      <version>2.15.2</version>
+      <version>2.15.3</version>
     </dependency>
   </dependencies>
";

    #[test]
    fn test_manifest_touch_matches_pom_header() {
        assert!(touches_manifest(VERSION_BUMP));
        assert!(touches_manifest("+++ b/module/core/pom.xml\n"));
        assert!(touches_manifest("+++b/pom.xml"));
    }

    #[test]
    fn test_manifest_touch_requires_line_start_and_suffix() {
        assert!(!touches_manifest("+++ b/README.md\n"));
        assert!(!touches_manifest(" +++ b/pom.xml\n"));
        assert!(!touches_manifest("++ b/pom.xml\n"));
        assert!(!touches_manifest("+++ b/pom.xml.bak\n"));
        assert!(!touches_manifest("+++ b/pom-xml\n"));
        assert!(!touches_manifest("--- a/pom.xml\n"));
        // The marker and the path must be on the same line.
        assert!(!touches_manifest("+++ b/\npom.xml\n"));
    }

    #[test]
    fn test_dependency_version_change() {
        assert!(changes_dependency_version(VERSION_BUMP));
    }

    #[test]
    fn test_dependency_version_change_needs_two_version_lines() {
        let added_only = "\
     <dependency>
       <artifactId>junit</artifactId>
+      <version>4.13.2</version>
     </dependency>
";
        assert!(!changes_dependency_version(added_only));
    }

    #[test]
    fn test_dependency_version_change_ignores_context_lines() {
        let unchanged = "\
     <dependency>
       <artifactId>junit</artifactId>
       <version>4.13.1</version>
-      <scope>compile</scope>
+      <scope>test</scope>
     </dependency>
";
        assert!(!changes_dependency_version(unchanged));
    }

    #[test]
    fn test_dependency_version_change_outside_dependency_block() {
        let project_version = "\
   <artifactId>my-app</artifactId>
-  <version>1.0.0</version>
+  <version>1.0.1</version>
   <packaging>jar</packaging>
";
        assert!(!changes_dependency_version(project_version));
    }

    #[test]
    fn test_dependency_version_change_with_property_placeholder() {
        let bump = "\
     <dependency>
-      <version>${old.version}</version>
+      <version>${new.version}</version>
     </dependency>
";
        assert!(changes_dependency_version(bump));
    }
}
