/// Injected before every document so page scripts never observe the
/// automation defaults (`navigator.webdriver`, empty plugin list, missing
/// `window.chrome`).
pub const STEALTH_SCRIPT: &str = r#"
(() => {
    try {
        const proto = Navigator.prototype;
        try {
            Object.defineProperty(proto, 'webdriver', {
                get: () => undefined,
                configurable: true,
            });
        } catch (e) {}
        try { delete navigator.webdriver; } catch (e) {}

        try {
            Object.defineProperty(proto, 'languages', {
                get: () => ['en-US', 'en'],
                configurable: true,
            });
        } catch (e) {}

        try {
            Object.defineProperty(proto, 'plugins', {
                get: () => [1, 2, 3, 4, 5],
                configurable: true,
            });
        } catch (e) {}

        try {
            Object.defineProperty(proto, 'hardwareConcurrency', {
                get: () => 8,
                configurable: true,
            });
        } catch (e) {}
    } catch (e) {}
})();

if (!window.chrome) {
    window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {} };
}

(() => {
    const query = window.navigator.permissions && window.navigator.permissions.query;
    if (!query) return;
    window.navigator.permissions.query = (parameters) =>
        parameters && parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : query(parameters);
})();

(() => {
    try {
        const getParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = function(parameter) {
            if (parameter === 37445) return 'Intel Inc.';
            if (parameter === 37446) return 'Intel Iris OpenGL Engine';
            return getParameter.apply(this, arguments);
        };
    } catch (e) {}
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_hides_webdriver() {
        assert!(STEALTH_SCRIPT.contains("'webdriver'"));
        assert!(STEALTH_SCRIPT.contains("window.chrome"));
    }
}
