//! Fixed code shipped inside every bundle.

/// Module table, loader, and interop helpers placed ahead of the module
/// definitions. Ids missing from the table fall through to the sandbox's
/// own `require`.
pub const PRELUDE: &str = r#"var __preview_modules = {};
var __preview_cache = {};
var __preview_has = Object.prototype.hasOwnProperty;
function __preview_require(id) {
  if (__preview_has.call(__preview_cache, id)) return __preview_cache[id].exports;
  if (!__preview_has.call(__preview_modules, id)) return require(id);
  var module = { exports: {} };
  __preview_cache[id] = module;
  __preview_modules[id].call(module.exports, module.exports, __preview_require, module);
  return module.exports;
}
function __preview_interop(mod) {
  if (mod && mod.__esModule) return mod;
  var ns = { default: mod };
  if (mod != null && (typeof mod === "object" || typeof mod === "function")) {
    for (var key in mod) {
      if (key !== "default" && __preview_has.call(mod, key)) ns[key] = mod[key];
    }
  }
  return ns;
}
function __preview_export(target, getters) {
  Object.defineProperty(target, "__esModule", { value: true });
  for (var name in getters) {
    Object.defineProperty(target, name, { get: getters[name], enumerable: true, configurable: true });
  }
}
function __preview_reexport(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key === "default" || __preview_has.call(target, key)) return;
    Object.defineProperty(target, key, {
      get: function () { return source[key]; },
      enumerable: true,
      configurable: true,
    });
  });
}
"#;

/// Source of the canonical renderer behind the reserved render specifier.
pub const RENDERER_SOURCE: &str = include_str!("../../runtime/render.js");

/// Location the renderer is presented at, relative to the project root.
pub const RENDERER_PATH: &str = "node_modules/@preview/render/index.js";
