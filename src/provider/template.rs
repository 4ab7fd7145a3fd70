//! Built-in Vite + React + Tailwind starter project.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::tree::VirtualFileTree;

use super::TreeProvider;

const PACKAGE_JSON: &str = r#"{
  "name": "vite-react-tailwind",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "lint": "eslint . --ext js,jsx --report-unused-disable-directives --max-warnings 0",
    "preview": "vite preview"
  },
  "dependencies": {
    "lucide-react": "^0.294.0",
    "react": "^18.2.0",
    "react-dom": "^18.2.0"
  },
  "devDependencies": {
    "@types/react": "^18.2.43",
    "@types/react-dom": "^18.2.17",
    "@vitejs/plugin-react": "^4.2.1",
    "autoprefixer": "^10.4.16",
    "eslint": "^8.55.0",
    "eslint-plugin-react": "^7.33.2",
    "eslint-plugin-react-hooks": "^4.6.0",
    "eslint-plugin-react-refresh": "^0.4.5",
    "postcss": "^8.4.32",
    "tailwindcss": "^3.4.0",
    "vite": "^5.0.8"
  }
}
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <link rel="icon" type="image/svg+xml" href="/vite.svg" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Vite + React + Tailwind</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

const VITE_CONFIG: &str = r#"import { defineConfig } from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({
  plugins: [react()],
})
"#;

const TAILWIND_CONFIG: &str = r#"/** @type {import('tailwindcss').Config} */
export default {
  content: [
    "./index.html",
    "./src/**/*.{js,ts,jsx,tsx}",
  ],
  theme: {
    extend: {},
  },
  plugins: [],
}
"#;

const POSTCSS_CONFIG: &str = r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
}
"#;

const ESLINTRC: &str = r#"module.exports = {
  root: true,
  env: { browser: true, es2020: true },
  extends: [
    'eslint:recommended',
    'plugin:react/recommended',
    'plugin:react/jsx-runtime',
    'plugin:react-hooks/recommended',
  ],
  ignorePatterns: ['dist', '.eslintrc.cjs'],
  parserOptions: { ecmaVersion: 'latest', sourceType: 'module' },
  settings: { react: { version: '18.2' } },
  plugins: ['react-refresh'],
  rules: {
    'react-refresh/only-export-components': [
      'warn',
      { allowConstantExport: true },
    ],
  },
}
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const APP_JSX: &str = r#"import { Home, Settings, User, Bell, Menu, Search } from 'lucide-react'

function App() {
  return (
    <div className="min-h-screen bg-gray-100">
      <nav className="bg-white shadow">
        <div className="max-w-7xl mx-auto px-4 sm:px-6 lg:px-8">
          <div className="flex justify-between items-center h-16">
            <div className="flex items-center">
              <Menu className="w-6 h-6 text-gray-600 mr-4 cursor-pointer" />
              <Home className="w-6 h-6 text-blue-600" />
              <span className="ml-2 text-xl font-semibold">Dashboard</span>
            </div>
            <div className="flex items-center space-x-4">
              <div className="relative">
                <Search className="w-5 h-5 text-gray-400 absolute left-3 top-1/2 transform -translate-y-1/2" />
                <input
                  type="text"
                  placeholder="Search..."
                  className="pl-10 pr-4 py-2 border rounded-lg focus:outline-none focus:ring-2 focus:ring-blue-500"
                />
              </div>
              <Bell className="w-6 h-6 text-gray-600 cursor-pointer hover:text-gray-900" />
              <Settings className="w-6 h-6 text-gray-600 cursor-pointer hover:text-gray-900" />
              <User className="w-6 h-6 text-gray-600 cursor-pointer hover:text-gray-900" />
            </div>
          </div>
        </div>
      </nav>

      <main>
        <div className="max-w-7xl mx-auto py-6 sm:px-6 lg:px-8">
          <div className="px-4 py-6 sm:px-0">
            <div className="border-4 border-dashed border-gray-200 rounded-lg h-96">
              <div className="flex flex-col items-center justify-center h-full">
                <h1 className="text-4xl font-bold text-gray-900 mb-4">
                  Welcome to Your Dashboard
                </h1>
                <p className="text-gray-600 text-center max-w-md">
                  This template includes Vite, React, Tailwind CSS, and Lucide icons.
                  Start building your awesome application!
                </p>
              </div>
            </div>
          </div>
        </div>
      </main>
    </div>
  )
}

export default App
"#;

const INDEX_CSS: &str = "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n";

/// Provider for the built-in starter project.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateProvider;

impl TemplateProvider {
    pub fn new() -> Self {
        Self
    }

    /// Builds the starter tree.
    pub fn tree() -> VirtualFileTree {
        VirtualFileTree::new()
            .with_file("package.json", PACKAGE_JSON)
            .with_file("index.html", INDEX_HTML)
            .with_file("vite.config.js", VITE_CONFIG)
            .with_file("tailwind.config.js", TAILWIND_CONFIG)
            .with_file("postcss.config.js", POSTCSS_CONFIG)
            .with_file(".eslintrc.cjs", ESLINTRC)
            .with_directory(
                "src",
                VirtualFileTree::new()
                    .with_file("main.jsx", MAIN_JSX)
                    .with_file("App.jsx", APP_JSX)
                    .with_file("index.css", INDEX_CSS),
            )
    }
}

#[async_trait]
impl TreeProvider for TemplateProvider {
    async fn get(&self) -> Result<VirtualFileTree> {
        let tree = Self::tree();
        tree.validate()
            .map_err(|e| Error::FileProvider(e.to_string()))?;
        Ok(tree)
    }

    fn name(&self) -> &str {
        "vite-react-tailwind"
    }
}
