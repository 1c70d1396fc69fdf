//! Typed view of a decoded `AndroidManifest.xml`.

use crate::value::{TypedValue, Value};
use crate::xml::{AndroidAttr, Document, Element};

const ACTION_MAIN: &str = "android.intent.action.MAIN";
const CATEGORY_LAUNCHER: &str = "android.intent.category.LAUNCHER";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ActivityKind {
    Activity,
    Alias,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub name: String,
    /// For aliases: the activity the alias launches.
    pub target_activity: Option<String>,
    /// Some intent filter holds both the MAIN action and the LAUNCHER category.
    pub is_main_launcher: bool,
}

/// The manifest fields metadata extraction reads. Values stay unresolved;
/// resource references are looked up later against a configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub package: Option<TypedValue>,
    pub version_code: Option<TypedValue>,
    pub version_name: Option<TypedValue>,
    pub min_sdk: Option<TypedValue>,
    pub target_sdk: Option<TypedValue>,
    pub label: Option<TypedValue>,
    pub icon: Option<TypedValue>,
    pub permissions: Vec<String>,
    pub meta_data: Vec<(String, TypedValue)>,
    /// Activities and activity aliases in document order.
    pub activities: Vec<Activity>,
}

impl Manifest {
    pub fn from_document(doc: &Document) -> Manifest {
        let root = &doc.root;
        let uses_sdk = root.child("uses-sdk");
        let application = root.child("application");

        let mut manifest = Manifest {
            package: root.attribute("package").cloned(),
            version_code: root.android_attribute(AndroidAttr::VersionCode).cloned(),
            version_name: root.android_attribute(AndroidAttr::VersionName).cloned(),
            min_sdk: uses_sdk
                .and_then(|e| e.android_attribute(AndroidAttr::MinSdkVersion))
                .cloned(),
            target_sdk: uses_sdk
                .and_then(|e| e.android_attribute(AndroidAttr::TargetSdkVersion))
                .cloned(),
            label: application
                .and_then(|e| e.android_attribute(AndroidAttr::Label))
                .cloned(),
            icon: application
                .and_then(|e| e.android_attribute(AndroidAttr::Icon))
                .cloned(),
            ..Manifest::default()
        };

        manifest.permissions = root
            .children("uses-permission")
            .filter_map(|e| literal_string(e.android_attribute(AndroidAttr::Name)))
            .collect();

        if let Some(application) = application {
            for e in application.children("meta-data") {
                let name = literal_string(e.android_attribute(AndroidAttr::Name));
                let value = e.android_attribute(AndroidAttr::Value);
                if let (Some(name), Some(value)) = (name, value) {
                    manifest.meta_data.push((name, value.clone()));
                }
            }

            manifest.activities = application
                .children
                .iter()
                .filter_map(Activity::from_element)
                .collect();
        }

        manifest
    }

    /// The activity started from the launcher: the first activity declaring
    /// MAIN/LAUNCHER, else the target of the first such alias.
    pub fn launch_activity(&self) -> Option<&str> {
        let launchers = || self.activities.iter().filter(|a| a.is_main_launcher);
        launchers()
            .find(|a| a.kind == ActivityKind::Activity)
            .map(|a| a.name.as_str())
            .or_else(|| {
                launchers()
                    .filter(|a| a.kind == ActivityKind::Alias)
                    .find_map(|a| a.target_activity.as_deref())
            })
    }
}

impl Activity {
    fn from_element(e: &Element) -> Option<Activity> {
        let kind = match e.name.as_str() {
            "activity" => ActivityKind::Activity,
            "activity-alias" => ActivityKind::Alias,
            _ => return None,
        };
        Some(Activity {
            kind,
            name: literal_string(e.android_attribute(AndroidAttr::Name)).unwrap_or_default(),
            target_activity: literal_string(e.android_attribute(AndroidAttr::TargetActivity)),
            is_main_launcher: e.children("intent-filter").any(is_main_launcher),
        })
    }
}

fn is_main_launcher(filter: &Element) -> bool {
    let has = |tag: &str, wanted: &str| {
        filter
            .children(tag)
            .any(|e| {
                literal_string(e.android_attribute(AndroidAttr::Name)).as_deref() == Some(wanted)
            })
    };
    has("action", ACTION_MAIN) && has("category", CATEGORY_LAUNCHER)
}

/// Class and permission names are always plain strings in practice.
fn literal_string(value: Option<&TypedValue>) -> Option<String> {
    match value? {
        TypedValue::Literal(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}
