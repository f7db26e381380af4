//! Scripted stand-ins for the JVM toolchain, shared by pipeline and runner tests.

use crate::config::ToolchainConfig;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Stands in for javac: concatenates every listed file into `<out>/all.src`,
/// fails when the sources contain `BROKEN` and hangs on `SLOW_COMPILE`.
const FAKE_COMPILER: &str = r#"#!/bin/sh
out=""
list=""
while [ $# -gt 0 ]; do
  case "$1" in
    -d) out="$2"; shift 2 ;;
    -cp) shift 2 ;;
    @*) list="${1#@}"; shift ;;
    *) shift ;;
  esac
done
mkdir -p "$out"
: > "$out/all.src"
while IFS= read -r f; do
  f="${f#\"}"
  f="${f%\"}"
  cat "$f" >> "$out/all.src"
done < "$list"
if grep -q SLOW_COMPILE "$out/all.src"; then
  exec sleep 30
fi
if grep -q BROKEN "$out/all.src"; then
  echo "Calculator.java:3: error: ';' expected" >&2
  exit 1
fi
exit 0
"#;

/// Stands in for the JVM test runner: reports three tests of the first test
/// class, each failing when its BREAK_* marker is in the compiled sources.
/// `SPOIL_STORE` replaces the `results` directory next to `work/` with a file.
const FAKE_RUNTIME: &str = r#"#!/bin/sh
cp="$2"
build="${cp%%:*}"
class="$4"
src="$build/all.src"
if grep -q HANG "$src"; then
  exec sleep 30
fi
if grep -q CRASH "$src"; then
  echo "Exception in thread \"main\" java.lang.StackOverflowError" >&2
  exit 3
fi
if grep -q NORESULT "$src"; then
  exit 0
fi
if grep -q SPOIL_STORE "$src"; then
  results="$build/../../../results"
  rm -rf "$results"
  : > "$results"
fi
if grep -q EMPTYDOC "$src"; then
  echo '{"test_classes": []}' > test_results.json
  exit 0
fi
outcome() {
  if grep -q "$1" "$src"; then echo false; else echo true; fi
}
add=$(outcome BREAK_ADD)
sub=$(outcome BREAK_SUB)
mul=$(outcome BREAK_MUL)
passed=0
for v in $add $sub $mul; do
  if [ "$v" = true ]; then passed=$((passed + 1)); fi
done
failed=$((3 - passed))
cat > test_results.json <<EOF
{
  "timestamp": "2024-01-01T00:00:00.000",
  "compiled": true,
  "test_classes": [
    {
      "test_class_name": "$class",
      "passed_tests": $passed,
      "failed_tests": $failed,
      "total_tests": 3,
      "test_results": [
{"test_name": "testAdd", "test_unique_id": "[class:$class]/[method:testAdd()]", "is_passed": $add},
{"test_name": "testSub", "test_unique_id": "[class:$class]/[method:testSub()]", "is_passed": $sub},
{"test_name": "testMul", "test_unique_id": "[class:$class]/[method:testMul()]", "is_passed": $mul}
      ]
    }
  ]
}
EOF
"#;

pub(crate) const CALCULATOR: &str = "public class Calculator {\n    int add(int a, int b) { return a + b; }\n}\n";

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, PermissionsExt::from_mode(0o755)).unwrap();
}

/// Lay out `src/`, `tests/` and a scripted toolchain under `root`.
pub(crate) fn setup(root: &Path) -> ToolchainConfig {
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    write_script(&bin.join("javac"), FAKE_COMPILER);
    write_script(&bin.join("java"), FAKE_RUNTIME);

    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/Calculator.java"), CALCULATOR).unwrap();
    std::fs::create_dir_all(root.join("tests")).unwrap();
    std::fs::write(
        root.join("tests/CalculatorTest.java"),
        "public class CalculatorTest {}\n",
    )
    .unwrap();
    std::fs::create_dir_all(root.join("lib")).unwrap();
    std::fs::write(root.join("lib/junit.jar"), "").unwrap();

    ToolchainConfig {
        compiler: bin.join("javac").to_string_lossy().into_owned(),
        runtime: bin.join("java").to_string_lossy().into_owned(),
        lib_dir: root.join("lib"),
        compile_timeout_seconds: 10,
        test_timeout_seconds: 10,
        ..Default::default()
    }
}
