//! Esperar: Page-Object UI Automation with Built-In Waiting
//!
//! Esperar (Spanish: "to wait/expect") locates and drives browser UI
//! elements through lazy page objects. Elements are declared once,
//! resolved on every use, and every query and interaction polls until
//! the page settles, so tests stay free of hand-written sleeps.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ESPERAR Architecture                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────────┐   ┌──────────────────────┐ │
//! │  │ Page     │   │ Wait engine   │   │ Driver trait         │ │
//! │  │ objects  │──►│ (tick, grace, │──►│ (WebDriver backend   │ │
//! │  │          │   │  conditions)  │   │  or mock)            │ │
//! │  └──────────┘   └───────────────┘   └──────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use esperar::mock::{MockDriver, MockElement};
//! use esperar::{Page, Session, Strategy, TIMEOUT};
//!
//! let driver = MockDriver::new();
//! driver.register(
//!     Strategy::Css,
//!     "[data-test-id='save']",
//!     &[MockElement::new("button")],
//! );
//! let session = Session::new(Box::new(driver.clone()), "chrome-1");
//!
//! let editor = Page::attach(&session, "editor");
//! editor.element("save", "save button").click(TIMEOUT).unwrap();
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod actions;

/// Declarative filters narrowing which candidates a query accepts
pub mod condition;

/// The backend seam: locator strategies, driver and element traits,
/// and the session wrapper page objects hang off.
pub mod driver;

mod element;
mod elements;
mod list_absence;
mod list_presence;

/// In-memory driver and element doubles for testing page objects
/// without a browser.
pub mod mock;

mod node;
mod result;
mod state;
mod task_pool;
mod window;

pub use condition::{Conditions, TextMatch};
pub use driver::{
    Driver, ElementHandle, Key, Locator, Session, Strategy, WindowHandle,
};
pub use element::{Element, Iframe, Page, Section};
pub use elements::Elements;
pub use node::{DEFAULT_ATTR_ID, TICK, TIMEOUT};
pub use result::{EsperarError, EsperarResult};
pub use task_pool::TaskPool;
