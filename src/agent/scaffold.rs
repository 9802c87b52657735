/// Starter content for new script files.
pub const SCAFFOLD: &str = r#"# rwork script
#
# Runs with the workspace root as the working directory. Files written here
# show up in list_exports and can be read back with read_export.
#
#   args <- commandArgs(trailingOnly = TRUE)
#   write.csv(head(mtcars), "mtcars_head.csv", row.names = FALSE)

"#;
