//! Control block - the debugging API an inspected page exposes as
//! `document.__sutil_cb`.
//!
//! The panel never touches the page directly. Every call is serialized into
//! a script (`document.__sutil_cb.Method(arg, ...)` with JSON arguments) by
//! [`inject`], evaluated in the page, and [`evaluate`] parses the script back
//! and dispatches it to a [`ControlBlock`].

use serde_json::Value;

use super::protocol::{LogCategory, MountPointInfo, StoreInfo, SutilOptions, CONTROL_BLOCK};
use crate::build::{mount_points, remount};
use crate::error::{Result, SutilError};
use crate::runtime::{LogCategories, Runtime};

/// Page-side debugging API.
pub trait ControlBlock {
    fn get_stores(&self) -> Vec<StoreInfo>;
    /// Current value of one store (`None` when the id is unknown).
    fn get_store_by_id(&self, id: usize) -> Option<Value>;
    fn get_options(&self) -> SutilOptions;
    fn set_options(&self, options: SutilOptions);
    fn get_log_categories(&self) -> Vec<LogCategory>;
    fn set_log_categories(&self, categories: Vec<LogCategory>);
    fn get_mount_points(&self) -> Vec<MountPointInfo>;
    fn remount(&self, id: &str) -> Result<()>;
}

// =============================================================================
// Calls
// =============================================================================

/// One control block call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMethod {
    GetStores,
    GetStoreById(usize),
    GetOptions,
    SetOptions(SutilOptions),
    GetLogCategories,
    SetLogCategories(Vec<LogCategory>),
    GetMountPoints,
    Remount(String),
}

impl ControlMethod {
    /// Method name on the page object.
    pub fn name(&self) -> &'static str {
        match self {
            ControlMethod::GetStores => "GetStores",
            ControlMethod::GetStoreById(_) => "GetStoreById",
            ControlMethod::GetOptions => "GetOptions",
            ControlMethod::SetOptions(_) => "SetOptions",
            ControlMethod::GetLogCategories => "GetLogCategories",
            ControlMethod::SetLogCategories(_) => "SetLogCategories",
            ControlMethod::GetMountPoints => "GetMountPoints",
            ControlMethod::Remount(_) => "Remount",
        }
    }

    fn args(&self) -> Result<Vec<Value>> {
        let arg = match self {
            ControlMethod::GetStoreById(id) => serde_json::to_value(id)?,
            ControlMethod::SetOptions(options) => serde_json::to_value(options)?,
            ControlMethod::SetLogCategories(list) => serde_json::to_value(list)?,
            ControlMethod::Remount(id) => serde_json::to_value(id)?,
            _ => return Ok(Vec::new()),
        };
        Ok(vec![arg])
    }

    fn from_call(name: &str, mut args: Vec<Value>) -> Result<Self> {
        let mut single = || -> Result<Value> {
            match args.len() {
                1 => Ok(args.remove(0)),
                n => Err(SutilError::MalformedScript(format!("{name} takes 1 argument, got {n}"))),
            }
        };
        Ok(match name {
            "GetStores" => ControlMethod::GetStores,
            "GetStoreById" => ControlMethod::GetStoreById(serde_json::from_value(single()?)?),
            "GetOptions" => ControlMethod::GetOptions,
            "SetOptions" => ControlMethod::SetOptions(serde_json::from_value(single()?)?),
            "GetLogCategories" => ControlMethod::GetLogCategories,
            "SetLogCategories" => ControlMethod::SetLogCategories(serde_json::from_value(single()?)?),
            "GetMountPoints" => ControlMethod::GetMountPoints,
            "Remount" => ControlMethod::Remount(serde_json::from_value(single()?)?),
            other => return Err(SutilError::UnknownMethod(other.to_string())),
        })
    }
}

/// Script text that performs `method` in the page.
pub fn inject(method: &ControlMethod) -> Result<String> {
    let args = method
        .args()?
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(format!("{CONTROL_BLOCK}.{}({})", method.name(), args.join(",")))
}

/// Parse a script produced by [`inject`].
pub fn parse_script(script: &str) -> Result<ControlMethod> {
    let malformed = || SutilError::MalformedScript(script.to_string());
    let call = script
        .trim()
        .strip_prefix(CONTROL_BLOCK)
        .and_then(|rest| rest.strip_prefix('.'))
        .ok_or_else(malformed)?;
    let open = call.find('(').ok_or_else(malformed)?;
    let name = &call[..open];
    let inner = call[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    let args: Vec<Value> = serde_json::from_str(&format!("[{inner}]"))?;
    ControlMethod::from_call(name, args)
}

/// Run `script` against `control`, returning the JSON result.
pub fn evaluate(control: &dyn ControlBlock, script: &str) -> Result<Value> {
    let method = parse_script(script)?;
    tracing::debug!(method = method.name(), "control block call");
    let value = match method {
        ControlMethod::GetStores => serde_json::to_value(control.get_stores())?,
        ControlMethod::GetStoreById(id) => control.get_store_by_id(id).unwrap_or(Value::Null),
        ControlMethod::GetOptions => serde_json::to_value(control.get_options())?,
        ControlMethod::SetOptions(options) => {
            control.set_options(options);
            Value::Null
        }
        ControlMethod::GetLogCategories => serde_json::to_value(control.get_log_categories())?,
        ControlMethod::SetLogCategories(list) => {
            control.set_log_categories(list);
            Value::Null
        }
        ControlMethod::GetMountPoints => serde_json::to_value(control.get_mount_points())?,
        ControlMethod::Remount(id) => {
            control.remount(&id)?;
            Value::Null
        }
    };
    Ok(value)
}

// =============================================================================
// Runtime-backed control block
// =============================================================================

/// The control block of a page running a [`Runtime`].
#[derive(Debug, Clone)]
pub struct PageControlBlock {
    runtime: Runtime,
}

impl PageControlBlock {
    pub fn new(runtime: &Runtime) -> Self {
        Self { runtime: runtime.clone() }
    }
}

impl ControlBlock for PageControlBlock {
    fn get_stores(&self) -> Vec<StoreInfo> {
        self.runtime.stores().snapshot()
    }

    fn get_store_by_id(&self, id: usize) -> Option<Value> {
        self.runtime.stores().value_of(id)
    }

    fn get_options(&self) -> SutilOptions {
        self.runtime.options()
    }

    fn set_options(&self, options: SutilOptions) {
        self.runtime.set_options(options);
    }

    fn get_log_categories(&self) -> Vec<LogCategory> {
        self.runtime.log_categories().to_vec()
    }

    fn set_log_categories(&self, categories: Vec<LogCategory>) {
        self.runtime.set_log_categories(LogCategories::new(categories));
    }

    fn get_mount_points(&self) -> Vec<MountPointInfo> {
        mount_points(&self.runtime)
    }

    fn remount(&self, id: &str) -> Result<()> {
        remount(&self.runtime, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{el, mount_element, text};
    use serde_json::json;

    #[test]
    fn test_inject_scripts() {
        assert_eq!(inject(&ControlMethod::GetStores).unwrap(), "document.__sutil_cb.GetStores()");
        assert_eq!(
            inject(&ControlMethod::GetStoreById(4)).unwrap(),
            "document.__sutil_cb.GetStoreById(4)"
        );
        assert_eq!(
            inject(&ControlMethod::SetLogCategories(vec![LogCategory("dom".into(), true)])).unwrap(),
            r#"document.__sutil_cb.SetLogCategories([["dom",true]])"#
        );
    }

    #[test]
    fn test_parse_roundtrip_of_every_method() {
        let methods = vec![
            ControlMethod::GetStores,
            ControlMethod::GetStoreById(9),
            ControlMethod::GetOptions,
            ControlMethod::SetOptions(SutilOptions { slow_animations: true, logging_enabled: true }),
            ControlMethod::GetLogCategories,
            ControlMethod::SetLogCategories(vec![LogCategory("x(y)".into(), false)]),
            ControlMethod::GetMountPoints,
            ControlMethod::Remount("app".into()),
        ];
        for method in methods {
            assert_eq!(parse_script(&inject(&method).unwrap()).unwrap(), method);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_script("window.alert(1)"), Err(SutilError::MalformedScript(_))));
        assert!(matches!(
            parse_script("document.__sutil_cb.GetStores"),
            Err(SutilError::MalformedScript(_))
        ));
        assert_eq!(
            parse_script("document.__sutil_cb.Explode()"),
            Err(SutilError::UnknownMethod("Explode".into()))
        );
        assert!(matches!(
            parse_script("document.__sutil_cb.GetStoreById()"),
            Err(SutilError::MalformedScript(_))
        ));
    }

    #[test]
    fn test_page_control_block() {
        let rt = Runtime::new();
        let doc = rt.create_document();
        let count = rt.make_store("count", 3);
        let control = PageControlBlock::new(&rt);

        let stores = evaluate(&control, "document.__sutil_cb.GetStores()").unwrap();
        assert_eq!(stores, json!([{"Id": 1, "Name": "count", "Value": 3}]));

        count.set(4);
        assert_eq!(evaluate(&control, "document.__sutil_cb.GetStoreById(1)").unwrap(), json!(4));
        assert_eq!(evaluate(&control, "document.__sutil_cb.GetStoreById(99)").unwrap(), Value::Null);

        let script = inject(&ControlMethod::SetOptions(SutilOptions {
            slow_animations: true,
            logging_enabled: false,
        }))
        .unwrap();
        evaluate(&control, &script).unwrap();
        assert!(rt.options().slow_animations);

        let host = doc.create_element("div");
        doc.set_attribute(host, "id", "app").unwrap();
        doc.append_child(doc.body(), host).unwrap();
        mount_element(&rt, &doc, "app", el("p", vec![text("x")])).unwrap();
        assert_eq!(
            evaluate(&control, "document.__sutil_cb.GetMountPoints()").unwrap(),
            json!([{"Id": "app", "MountId": 1}])
        );
        evaluate(&control, r#"document.__sutil_cb.Remount("app")"#).unwrap();
        assert_eq!(
            evaluate(&control, r#"document.__sutil_cb.Remount("nope")"#),
            Err(SutilError::MountPointNotFound("nope".into()))
        );
    }

    #[test]
    fn test_log_categories_roundtrip() {
        let rt = Runtime::new();
        let control = PageControlBlock::new(&rt);
        let mut categories = control.get_log_categories();
        assert_eq!(categories.len(), 7);
        categories[0].1 = true;
        control.set_log_categories(categories.clone());
        assert_eq!(control.get_log_categories(), categories);
        assert!(rt.log_categories().is_enabled("store"));
    }
}
