/// Script, Lua and metadata text emitted for a build.
pub mod generate;
