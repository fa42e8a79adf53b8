//! Generators for test definition texts.

/// Creates a minimal valid definition with one click.
pub fn create_minimal_definition() -> String {
    r##"
test: Minimal
do:
  - c: "#go"
"##
    .to_string()
}

/// Creates a login definition with a data variable and a navigation base.
///
/// Compiles to four operations: navigate, type, click, assert.
pub fn create_login_definition() -> String {
    r##"
test: Login
nav: https://app.example.com
data:
  user: alice
do:
  - nav: /login
  - t: { "#user": "{{user}}" }
  - c: "#submit"
  - ch: Welcome
"##
    .to_string()
}

/// Creates a definition with `count` independent clicks on `#item-1..count`.
pub fn create_click_sequence_definition(count: usize) -> String {
    let mut text = String::from("test: Sequence\ndo:\n");
    for i in 1..=count {
        text.push_str(&format!("  - c: \"#item-{}\"\n", i));
    }
    text
}

/// Creates a definition whose loop unrolls to `rows * 2` operations.
pub fn create_loop_definition(rows: u32) -> String {
    format!(
        r##"
test: Rows
data:
  rows: {}
do:
  - loop:
      times: "{{{{rows}}}}"
      as: row
      do:
        - c: "#row-{{{{row}}}}"
        - ch: "Row {{{{row}}}}"
"##,
        rows
    )
}

/// Creates a definition referencing an undeclared variable on line 5.
pub fn create_undefined_variable_definition() -> String {
    r##"
test: Missing
do:
  - note: start
  - c: "{{foo}}"
"##
    .to_string()
}

/// Creates a definition that fails to parse: no `test` name, no actions.
pub fn create_unparseable_definition() -> String {
    "desc: nothing else\n".to_string()
}
