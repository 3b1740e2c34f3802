//! Declaration macro for extension points.

/// Implement [`ExtensionPoint`](crate::ExtensionPoint) for a `dyn Trait`.
///
/// The entries after `name` are optional but must appear in order:
/// `scope`, `default`, `adaptive`.
///
/// # Example
///
/// ```rust
/// use relay_extension::{extension_point, Extension, ExtensionScope};
///
/// pub trait Transporter: Extension {
///     fn connect(&self) -> String;
/// }
///
/// extension_point! {
///     dyn Transporter {
///         name: "demo.rpc.Transporter",
///         scope: ExtensionScope::Framework,
///         default: "tcp",
///     }
/// }
/// ```
///
/// An adaptive facade is declared with a constructor taking the binding:
///
/// ```rust,ignore
/// extension_point! {
///     dyn Transporter {
///         name: "demo.rpc.Transporter",
///         default: "tcp",
///         adaptive: |binding| Box::new(AdaptiveTransporter { binding }),
///     }
/// }
/// ```
#[macro_export]
macro_rules! extension_point {
    (
        dyn $point:path {
            name: $name:expr
            $(, scope: $scope:expr)?
            $(, default: $default:expr)?
            $(, adaptive: $adaptive:expr)?
            $(,)?
        }
    ) => {
        impl $crate::ExtensionPoint for dyn $point {
            fn point_name() -> &'static str {
                $name
            }

            $(
                fn scope() -> $crate::ExtensionScope {
                    $scope
                }
            )?

            $(
                fn default_name() -> ::core::option::Option<&'static str> {
                    ::core::option::Option::Some($default)
                }
            )?

            $(
                fn adaptive(
                    binding: $crate::AdaptiveBinding<Self>,
                ) -> ::core::option::Option<::std::boxed::Box<Self>> {
                    ::core::option::Option::Some(($adaptive)(binding))
                }
            )?

            fn as_extension(&self) -> &dyn $crate::Extension {
                self
            }

            fn as_extension_mut(&mut self) -> &mut dyn $crate::Extension {
                self
            }
        }
    };
}
