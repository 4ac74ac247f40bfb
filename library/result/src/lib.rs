use error::SfError;

/// A Result is an alias of [std::result::Result](std::result::Result) with its error variant
/// pre-populated with a `Box<dyn SfError>`. This allows for shorter
/// notation throughout the codebase.
///
/// For example, instead of writing...
///
/// ```
/// use error::SfError;
///
/// fn greet() -> Result<&'static str, Box<dyn SfError>> {
///     Ok("Hello, SanFran!")
/// }
/// ```
///
/// ...you can simply say...
///
/// ```
/// use error::SfError;
/// use result::Result;
///
/// fn greet() -> Result<&'static str> {
///     Ok("Hello, SanFran!")
/// }
/// ```
///
/// It also helps in easily identifying if any functions are returning errors
/// BEFORE converting them into project native [SfError](error::SfError)s.
pub type Result<T> = std::result::Result<T, Box<dyn SfError>>;
